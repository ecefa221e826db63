//! Archetype graph: the set of component types an entity carries, held in sorted order, with an
//! edge cache memoizing single-component add/remove transitions (`spec.md` §3, §4.2; grounded on
//! `examples/original_source/.../ecs/details/archetype.hpp`'s `ArchetypeEdgeKey`/`EdgeMap`).

use fxhash::FxHashMap;

use crate::component::ComponentId;
use crate::sparse_set::SparseSet;

/// Index into the world's stable archetype arena. Archetypes reference each other only by this
/// index (Design Notes §9: "implement as indices into a stable arena... rather than raw
/// pointers"), so the arena can grow without invalidating existing edges.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
enum EdgeKind {
    Add,
    Remove,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
struct EdgeKey {
    component: ComponentId,
    kind: EdgeKind,
}

/// An equivalence class of entities by their exact component type set.
pub struct Archetype {
    id: ArchetypeId,
    types: Box<[ComponentId]>,
    /// Member entities, keyed by entity index, giving O(1) presence checks.
    members: SparseSet<()>,
    /// Order in which member entities were inserted; kept in lockstep with `members`' dense
    /// array via swap-and-pop so iteration order matches `members.keys()`.
    entities: Vec<crate::entity::Entity>,
    edges: FxHashMap<EdgeKey, ArchetypeId>,
    /// Bumped on every add/remove of a member entity. Not part of the world's structural
    /// version: `spec.md` is explicit that entity add/remove within an archetype does not bump
    /// the structural version, only archetype creation/destruction or entity-archetype moves.
    generation: u64,
}

impl Archetype {
    pub(crate) fn new(id: ArchetypeId, mut types: Vec<ComponentId>) -> Self {
        types.sort();
        types.dedup();
        Self {
            id,
            types: types.into_boxed_slice(),
            members: SparseSet::new(),
            entities: Vec::new(),
            edges: FxHashMap::default(),
            generation: 0,
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn types(&self) -> &[ComponentId] {
        &self.types
    }

    pub fn has_component(&self, id: ComponentId) -> bool {
        self.types.binary_search(&id).is_ok()
    }

    /// A `With`/`Without` match: superset of `with`, disjoint from `without`.
    pub fn matches(&self, with: &[ComponentId], without: &[ComponentId]) -> bool {
        with.iter().all(|c| self.has_component(*c)) && without.iter().all(|c| !self.has_component(*c))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, entity: crate::entity::Entity) -> bool {
        self.members.contains(entity.index())
    }

    pub fn entities(&self) -> &[crate::entity::Entity] {
        &self.entities
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn add_entity(&mut self, entity: crate::entity::Entity) {
        if self.members.contains(entity.index()) {
            return;
        }
        self.members.insert(entity.index(), ());
        self.entities.push(entity);
        self.generation += 1;
    }

    /// Removes `entity`, swap-removing it out of the dense entity list in lockstep with the
    /// presence sparse set. Returns `true` if the entity was present.
    pub(crate) fn remove_entity(&mut self, entity: crate::entity::Entity) -> bool {
        if self.members.remove(entity.index()).is_none() {
            return false;
        }
        if let Some(pos) = self.entities.iter().position(|e| *e == entity) {
            self.entities.swap_remove(pos);
        }
        self.generation += 1;
        true
    }

    pub(crate) fn get_edge(&self, component: ComponentId, adding: bool) -> Option<ArchetypeId> {
        let kind = if adding { EdgeKind::Add } else { EdgeKind::Remove };
        self.edges.get(&EdgeKey { component, kind }).copied()
    }

    pub(crate) fn set_edge(&mut self, component: ComponentId, adding: bool, target: ArchetypeId) {
        let kind = if adding { EdgeKind::Add } else { EdgeKind::Remove };
        self.edges.insert(EdgeKey { component, kind }, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityAllocator;

    struct Position;
    struct Velocity;

    #[test]
    fn sorted_deduped_types() {
        let a = Archetype::new(
            ArchetypeId(0),
            vec![ComponentId::of::<Velocity>(), ComponentId::of::<Position>(), ComponentId::of::<Position>()],
        );
        assert_eq!(a.types().len(), 2);
        assert!(a.types().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn matches_with_without() {
        let a = Archetype::new(ArchetypeId(0), vec![ComponentId::of::<Position>()]);
        assert!(a.matches(&[ComponentId::of::<Position>()], &[]));
        assert!(!a.matches(&[ComponentId::of::<Position>()], &[ComponentId::of::<Position>()]));
        assert!(!a.matches(&[ComponentId::of::<Velocity>()], &[]));
    }

    #[test]
    fn add_remove_entity_bumps_generation_not_on_noop() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        let mut a = Archetype::new(ArchetypeId(0), vec![]);
        a.add_entity(e);
        assert_eq!(a.generation(), 1);
        // re-adding the same member is a no-op
        a.add_entity(e);
        assert_eq!(a.generation(), 1);
        assert!(a.remove_entity(e));
        assert_eq!(a.generation(), 2);
    }

    #[test]
    fn edge_cache_roundtrip() {
        let mut a = Archetype::new(ArchetypeId(0), vec![]);
        let target = ArchetypeId(1);
        a.set_edge(ComponentId::of::<Position>(), true, target);
        assert_eq!(a.get_edge(ComponentId::of::<Position>(), true), Some(target));
        assert_eq!(a.get_edge(ComponentId::of::<Position>(), false), None);
    }
}
