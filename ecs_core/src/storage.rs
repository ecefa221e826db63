//! Per-component-type dense storage: a sparse set keyed by entity index, created lazily on first
//! write of that type (`spec.md` §3).

use downcast_rs::{impl_downcast, Downcast};
use fxhash::FxHashMap;

use crate::component::{Component, ComponentId};
use crate::sparse_set::SparseSet;

/// Type-erased access to a single component type's storage. Concrete storage is
/// [`ComponentColumn<T>`]; callers downcast via [`downcast-rs`] to get typed access.
pub trait ComponentColumnErased: Downcast + Send + Sync {
    fn remove_erased(&mut self, entity_index: u32);
    fn contains(&self, entity_index: u32) -> bool;
    fn len(&self) -> usize;
}
impl_downcast!(ComponentColumnErased);

/// Dense/sparse storage for one concrete component type `T`.
pub struct ComponentColumn<T: Component> {
    data: SparseSet<T>,
}

impl<T: Component> ComponentColumn<T> {
    fn new() -> Self {
        Self {
            data: SparseSet::new(),
        }
    }

    pub fn insert(&mut self, entity_index: u32, value: T) -> Option<T> {
        self.data.insert(entity_index, value)
    }

    pub fn get(&self, entity_index: u32) -> Option<&T> {
        self.data.get(entity_index)
    }

    pub fn get_mut(&mut self, entity_index: u32) -> Option<&mut T> {
        self.data.get_mut(entity_index)
    }

    pub fn remove(&mut self, entity_index: u32) -> Option<T> {
        self.data.remove(entity_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.data.iter_mut()
    }
}

impl<T: Component> ComponentColumnErased for ComponentColumn<T> {
    fn remove_erased(&mut self, entity_index: u32) {
        self.data.remove(entity_index);
    }

    fn contains(&self, entity_index: u32) -> bool {
        self.data.contains(entity_index)
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

/// Owns one [`ComponentColumn<T>`] per component type discovered so far in the world.
#[derive(Default)]
pub struct ComponentRegistry {
    columns: FxHashMap<ComponentId, Box<dyn ComponentColumnErased>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the column for `T`, creating it (empty) on first access.
    pub fn column_mut<T: Component>(&mut self) -> &mut ComponentColumn<T> {
        let id = ComponentId::of::<T>();
        self.columns
            .entry(id)
            .or_insert_with(|| Box::new(ComponentColumn::<T>::new()))
            .downcast_mut::<ComponentColumn<T>>()
            .expect("component column type mismatch: ComponentId is not injective")
    }

    pub fn column<T: Component>(&self) -> Option<&ComponentColumn<T>> {
        self.columns
            .get(&ComponentId::of::<T>())
            .and_then(|c| c.downcast_ref::<ComponentColumn<T>>())
    }

    pub fn column_mut_opt<T: Component>(&mut self) -> Option<&mut ComponentColumn<T>> {
        self.columns
            .get_mut(&ComponentId::of::<T>())
            .and_then(|c| c.downcast_mut::<ComponentColumn<T>>())
    }

    /// Removes `entity_index`'s value from every column that declares it present. Used when an
    /// entity is destroyed outright (its archetype membership alone does not free component
    /// bytes, since columns are keyed by entity index directly).
    pub fn remove_all(&mut self, entity_index: u32) {
        for column in self.columns.values_mut() {
            if column.contains(entity_index) {
                column.remove_erased(entity_index);
            }
        }
    }

    pub fn remove_component(&mut self, id: ComponentId, entity_index: u32) {
        if let Some(column) = self.columns.get_mut(&id) {
            column.remove_erased(entity_index);
        }
    }

    /// Returns one `&mut dyn ComponentColumnErased` per id in `ids`, taken from a shared `&self`
    /// receiver rather than `&mut self`.
    ///
    /// SAFETY contract: callers must guarantee `ids` are pairwise distinct (the query engine
    /// enforces this — each tuple slot in a [`crate::query::QueryTuple`] is a distinct Rust type)
    /// and that no other live borrow of `self` overlaps the returned references. This is the same
    /// "split a map by disjoint keys" pattern `HashMap::get_many_mut` stabilizes for slices; it is
    /// reimplemented here by hand because that API is not yet stable for arbitrary maps.
    pub fn get_many_mut<const N: usize>(&self, ids: [ComponentId; N]) -> [Option<&mut dyn ComponentColumnErased>; N] {
        if cfg!(debug_assertions) {
            for i in 0..N {
                for j in (i + 1)..N {
                    debug_assert_ne!(ids[i], ids[j], "get_many_mut called with duplicate component ids");
                }
            }
        }
        let ptr = self as *const Self as *mut Self;
        ids.map(|id| unsafe { (*ptr).columns.get_mut(&id) }.map(|b| b.as_mut() as &mut dyn ComponentColumnErased))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position(f32, f32);

    #[test]
    fn lazy_column_creation_and_roundtrip() {
        let mut reg = ComponentRegistry::new();
        assert!(reg.column::<Position>().is_none());

        reg.column_mut::<Position>().insert(0, Position(1.0, 2.0));
        assert_eq!(reg.column::<Position>().unwrap().get(0), Some(&Position(1.0, 2.0)));
    }

    #[test]
    fn remove_all_clears_every_column() {
        struct Velocity(f32);
        let mut reg = ComponentRegistry::new();
        reg.column_mut::<Position>().insert(5, Position(0.0, 0.0));
        reg.column_mut::<Velocity>().insert(5, Velocity(1.0));

        reg.remove_all(5);

        assert!(reg.column::<Position>().unwrap().get(5).is_none());
        assert!(reg.column::<Velocity>().unwrap().get(5).is_none());
    }
}
