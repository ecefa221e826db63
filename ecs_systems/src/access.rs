//! Declared read/write access for a system: the raw material the scheduler derives conflict
//! edges from (`spec.md` §4.1). Grounded on the teacher's `Schedulable::reads`/`writes` split
//! (`examples/0x112233-legion/src/system.rs`), generalized from `(resources, components)` pairs
//! to a single `Access` record so set-level access can be computed by simple union.

use std::any::TypeId;

use ecs_core::component::ComponentId;

#[derive(Clone, Default, Debug)]
pub struct Access {
    pub read_resources: Vec<TypeId>,
    pub write_resources: Vec<TypeId>,
    pub read_components: Vec<ComponentId>,
    pub write_components: Vec<ComponentId>,
}

impl Access {
    pub fn union(mut self, other: &Access) -> Self {
        self.read_resources.extend(other.read_resources.iter().copied());
        self.write_resources.extend(other.write_resources.iter().copied());
        self.read_components.extend(other.read_components.iter().copied());
        self.write_components.extend(other.write_components.iter().copied());
        self
    }

    /// `true` if `self` and `other` cannot safely run concurrently: a write in one overlaps any
    /// access (read or write) of the same resource/component in the other. Read-read never
    /// conflicts (`spec.md` §4.1).
    pub fn conflicts_with(&self, other: &Access) -> bool {
        let res_conflict = self.write_resources.iter().any(|r| other.read_resources.contains(r) || other.write_resources.contains(r))
            || other.write_resources.iter().any(|r| self.read_resources.contains(r));
        if res_conflict {
            return true;
        }
        self.write_components.iter().any(|c| other.read_components.contains(c) || other.write_components.contains(c))
            || other.write_components.iter().any(|c| self.read_components.contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_read_does_not_conflict() {
        let a = Access { read_resources: vec![TypeId::of::<u32>()], ..Default::default() };
        let b = Access { read_resources: vec![TypeId::of::<u32>()], ..Default::default() };
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn write_write_conflicts() {
        let a = Access { write_resources: vec![TypeId::of::<u32>()], ..Default::default() };
        let b = Access { write_resources: vec![TypeId::of::<u32>()], ..Default::default() };
        assert!(a.conflicts_with(&b));
    }

    #[test]
    fn read_write_conflicts() {
        let a = Access { read_resources: vec![TypeId::of::<u32>()], ..Default::default() };
        let b = Access { write_resources: vec![TypeId::of::<u32>()], ..Default::default() };
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
    }

    #[test]
    fn disjoint_resources_do_not_conflict() {
        let a = Access { write_resources: vec![TypeId::of::<u32>()], ..Default::default() };
        let b = Access { write_resources: vec![TypeId::of::<u64>()], ..Default::default() };
        assert!(!a.conflicts_with(&b));
    }
}
