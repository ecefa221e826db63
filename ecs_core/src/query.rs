//! Query engine: filter entities by component-type signature, fetch typed borrows, iterate with
//! an ordinary `Iterator` (`spec.md` §4.2). Grounded on the teacher's `View`/`ReadOnly` read/write
//! split and `PreparedQuery` tuple pattern (`examples/0x112233-legion/src/query.rs`), replacing
//! its chunk-based storage with the flatter per-type sparse-set storage this workspace uses.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::archetype::ArchetypeId;
use crate::component::{Component, ComponentId};
use crate::entity::Entity;
use crate::storage::{ComponentColumn, ComponentColumnErased, ComponentRegistry};
use crate::world::World;

/// One fetched data slot in a query's tuple. Implemented directly on `&T`/`&mut T` (mirroring the
/// teacher's `Read<T>`/`Write<T>` split) and on [`Optional`] for either.
pub trait Fetch {
    type Item<'w>;

    fn component_id() -> ComponentId;
    fn is_write() -> bool;

    /// Resolves this slot's item for `entity_index` out of the column already looked up for
    /// `Self::component_id()`. Returns `None` only when the column itself is absent or the
    /// entity is absent from it — for a required (non-[`Optional`]) slot this can only happen if
    /// a caller bypassed archetype matching, so callers `.expect()` it away; for `Optional` it is
    /// the ordinary "absent" case, surfaced one layer further in.
    fn fetch_from_column<'w>(
        column: Option<&'w mut dyn ComponentColumnErased>,
        entity_index: u32,
    ) -> Option<Self::Item<'w>>;
}

impl<T: Component> Fetch for &T {
    type Item<'w> = &'w T;

    fn component_id() -> ComponentId {
        ComponentId::of::<T>()
    }

    fn is_write() -> bool {
        false
    }

    fn fetch_from_column<'w>(
        column: Option<&'w mut dyn ComponentColumnErased>,
        entity_index: u32,
    ) -> Option<&'w T> {
        column
            .and_then(|c| c.downcast_ref::<ComponentColumn<T>>())
            .and_then(|c| c.get(entity_index))
    }
}

impl<T: Component> Fetch for &mut T {
    type Item<'w> = &'w mut T;

    fn component_id() -> ComponentId {
        ComponentId::of::<T>()
    }

    fn is_write() -> bool {
        true
    }

    fn fetch_from_column<'w>(
        column: Option<&'w mut dyn ComponentColumnErased>,
        entity_index: u32,
    ) -> Option<&'w mut T> {
        column
            .and_then(|c| c.downcast_mut::<ComponentColumn<T>>())
            .and_then(|c| c.get_mut(entity_index))
    }
}

/// Marks a data slot as present-or-absent rather than required. A query with an `Optional<&T>`
/// slot matches archetypes regardless of whether they carry `T`.
pub struct Optional<F>(PhantomData<F>);

impl<F: Fetch> Fetch for Optional<F> {
    type Item<'w> = Option<F::Item<'w>>;

    fn component_id() -> ComponentId {
        F::component_id()
    }

    fn is_write() -> bool {
        F::is_write()
    }

    fn fetch_from_column<'w>(
        column: Option<&'w mut dyn ComponentColumnErased>,
        entity_index: u32,
    ) -> Option<Option<F::Item<'w>>> {
        Some(F::fetch_from_column(column, entity_index))
    }
}

/// Filter-only marker: the queried archetype must carry `T`, but `T` itself is not fetched.
pub struct With<T>(PhantomData<T>);
/// Filter-only marker: the queried archetype must NOT carry `T`.
pub struct Without<T>(PhantomData<T>);

pub trait QueryFilter {
    fn with_ids() -> Vec<ComponentId>;
    fn without_ids() -> Vec<ComponentId>;
}

impl QueryFilter for () {
    fn with_ids() -> Vec<ComponentId> {
        Vec::new()
    }
    fn without_ids() -> Vec<ComponentId> {
        Vec::new()
    }
}

impl<T: Component> QueryFilter for With<T> {
    fn with_ids() -> Vec<ComponentId> {
        vec![ComponentId::of::<T>()]
    }
    fn without_ids() -> Vec<ComponentId> {
        Vec::new()
    }
}

impl<T: Component> QueryFilter for Without<T> {
    fn with_ids() -> Vec<ComponentId> {
        Vec::new()
    }
    fn without_ids() -> Vec<ComponentId> {
        vec![ComponentId::of::<T>()]
    }
}

/// A tuple of [`Fetch`] slots. Implemented for 1- through 4-element tuples by the macro below.
pub trait QueryTuple {
    type Item<'w>;

    fn component_ids() -> Vec<ComponentId>;
    fn write_ids() -> Vec<ComponentId>;
    fn fetch<'w>(registry: &'w ComponentRegistry, entity_index: u32) -> Self::Item<'w>;
}

macro_rules! impl_query_filter_tuple {
    ($($name:ident),+) => {
        impl<$($name: QueryFilter),+> QueryFilter for ($($name,)+) {
            fn with_ids() -> Vec<ComponentId> {
                let mut ids = Vec::new();
                $(ids.extend($name::with_ids());)+
                ids
            }
            fn without_ids() -> Vec<ComponentId> {
                let mut ids = Vec::new();
                $(ids.extend($name::without_ids());)+
                ids
            }
        }
    };
}

impl_query_filter_tuple!(A);
impl_query_filter_tuple!(A, B);
impl_query_filter_tuple!(A, B, C);
impl_query_filter_tuple!(A, B, C, D);

macro_rules! impl_query_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Fetch),+> QueryTuple for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);

            fn component_ids() -> Vec<ComponentId> {
                vec![$($name::component_id()),+]
            }

            fn write_ids() -> Vec<ComponentId> {
                let mut ids = Vec::new();
                $(if $name::is_write() { ids.push($name::component_id()); })+
                ids
            }

            fn fetch<'w>(registry: &'w ComponentRegistry, entity_index: u32) -> Self::Item<'w> {
                // SAFETY contract: every id in `component_ids()` is distinct (each tuple slot is
                // a distinct Rust type, and `spec.md` forbids repeating a component type within
                // one query), so the `&mut dyn ComponentColumnErased` handles obtained below never
                // alias each other. Callers reach `fetch` only through `World`'s access-policy
                // validation (or, in debug builds without it, at their own risk), which is what
                // guarantees no other borrow of `registry` is live for the duration of this call.
                let ids = [$($name::component_id()),+];
                let columns = registry.get_many_mut(ids);
                let [$($name),+] = columns;
                ($($name::fetch_from_column($name, entity_index).expect(
                    "fetched component missing from an archetype the query matched: storage invariant violated"
                ),)+)
            }
        }
    };
}

impl_query_tuple!(A:0);
impl_query_tuple!(A:0, B:1);
impl_query_tuple!(A:0, B:1, C:2);
impl_query_tuple!(A:0, B:1, C:2, D:3);

/// Key under which a query's matching-archetype list is cached, per `spec.md` §4.2: sorted
/// `With`, sorted `Without`, and a mutability mask, so two queries over the same data but
/// differing only in filters or mutability get independent cache entries.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
struct QueryCacheKey {
    with: Vec<ComponentId>,
    without: Vec<ComponentId>,
    write_mask: Vec<ComponentId>,
}

struct CacheEntry {
    structural_version: u64,
    archetypes: Vec<ArchetypeId>,
}

/// Reusable, cached query over a [`World`]. Construct once (e.g. as system-local state) and call
/// [`Query::iter`] every invocation; the archetype list is only recomputed when the world's
/// structural version has moved past what was cached.
pub struct Query<Q: QueryTuple, F: QueryFilter = ()> {
    key: QueryCacheKey,
    cache: RefCell<Option<CacheEntry>>,
    _marker: PhantomData<(Q, F)>,
}

impl<Q: QueryTuple, F: QueryFilter> Default for Query<Q, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: QueryTuple, F: QueryFilter> Query<Q, F> {
    pub fn new() -> Self {
        let mut with = F::with_ids();
        with.extend(Q::component_ids());
        with.sort();
        with.dedup();
        let mut without = F::without_ids();
        without.sort();
        let mut write_mask = Q::write_ids();
        write_mask.sort();

        Self {
            key: QueryCacheKey { with, without, write_mask },
            cache: RefCell::new(None),
            _marker: PhantomData,
        }
    }

    fn matching_archetypes(&self, world: &World) -> Vec<ArchetypeId> {
        let version = world.structural_version();
        {
            let cache = self.cache.borrow();
            if let Some(entry) = cache.as_ref() {
                if entry.structural_version == version {
                    return entry.archetypes.clone();
                }
            }
        }
        let archetypes: Vec<ArchetypeId> = world
            .archetypes()
            .filter(|a| a.matches(&self.key.with, &self.key.without))
            .map(|a| a.id())
            .collect();
        *self.cache.borrow_mut() = Some(CacheEntry {
            structural_version: version,
            archetypes: archetypes.clone(),
        });
        archetypes
    }

    /// Iterates every matching entity's data tuple alongside its [`Entity`] handle.
    pub fn iter<'w>(&self, world: &'w World) -> QueryIter<'w, Q> {
        let archetypes = self.matching_archetypes(world);
        let entities: Vec<Entity> = archetypes
            .iter()
            .flat_map(|id| world.archetype(*id).entities().iter().copied())
            .collect();
        QueryIter {
            world,
            entities: entities.into_iter(),
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self, world: &World) -> bool {
        self.matching_archetypes(world)
            .iter()
            .all(|id| world.archetype(*id).is_empty())
    }
}

/// The base query iterator: a real [`Iterator`], so `.filter()`, `.map()`, `.enumerate()`,
/// `.take()`, `.skip()` compose with it via the standard library's own adapters rather than
/// bespoke re-implementations, and `.fold()`/`.any()`/`.all()`/`.find()`/`.collect()` likewise —
/// only [`QuerySinkExt::find_first`], [`QuerySinkExt::count_if`] and
/// [`QuerySinkExt::collect_with`] add names the standard adapters don't already spell.
pub struct QueryIter<'w, Q: QueryTuple> {
    world: &'w World,
    entities: std::vec::IntoIter<Entity>,
    _marker: PhantomData<Q>,
}

impl<'w, Q: QueryTuple> Iterator for QueryIter<'w, Q> {
    type Item = (Entity, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let entity = self.entities.next()?;
        let item = Q::fetch(self.world.components(), entity.index());
        Some((entity, item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entities.size_hint()
    }
}

/// Extra sink-style adapters named the way `spec.md` §4.2 names them, built on top of the
/// ordinary [`Iterator`] ones.
pub trait QuerySinkExt: Iterator + Sized {
    fn find_first(mut self) -> Option<Self::Item> {
        self.next()
    }

    fn count_if(self, mut predicate: impl FnMut(&Self::Item) -> bool) -> usize {
        self.filter(|item| predicate(item)).count()
    }

    fn collect_with<B: Default + Extend<Self::Item>>(self) -> B {
        let mut out = B::default();
        out.extend(self);
        out
    }
}

impl<I: Iterator> QuerySinkExt for I {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Position(f32, f32);
    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Velocity(f32, f32);
    struct Frozen;

    #[test]
    fn query_matches_required_components() {
        let mut world = World::new();
        let e1 = world.spawn();
        world.insert_component(e1, Position(0.0, 0.0));
        world.insert_component(e1, Velocity(1.0, 1.0));

        let e2 = world.spawn();
        world.insert_component(e2, Position(5.0, 5.0));

        let query: Query<(&Position, &Velocity)> = Query::new();
        let results: Vec<_> = query.iter(&world).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, e1);
    }

    #[test]
    fn mutable_fetch_writes_through() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert_component(e, Position(0.0, 0.0));

        let query: Query<(&mut Position,)> = Query::new();
        for (_, (pos,)) in query.iter(&world) {
            pos.0 += 1.0;
        }
        assert_eq!(world.get_component::<Position>(e), Some(&Position(1.0, 0.0)));
    }

    #[test]
    fn optional_component_present_and_absent() {
        let mut world = World::new();
        let with_vel = world.spawn();
        world.insert_component(with_vel, Position(0.0, 0.0));
        world.insert_component(with_vel, Velocity(1.0, 0.0));

        let without_vel = world.spawn();
        world.insert_component(without_vel, Position(2.0, 0.0));

        let query: Query<(&Position, Optional<&Velocity>)> = Query::new();
        let results: std::collections::HashMap<_, _> = query.iter(&world).collect();
        assert!(results[&with_vel].1.is_some());
        assert!(results[&without_vel].1.is_none());
    }

    #[test]
    fn without_filter_excludes_archetype() {
        let mut world = World::new();
        let active = world.spawn();
        world.insert_component(active, Position(0.0, 0.0));

        let frozen = world.spawn();
        world.insert_component(frozen, Position(1.0, 0.0));
        world.insert_component(frozen, Frozen);

        let query: Query<(&Position,), Without<Frozen>> = Query::new();
        let results: Vec<_> = query.iter(&world).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, active);
    }

    #[test]
    fn sink_adapters_count_if_and_collect_with() {
        let mut world = World::new();
        for i in 0..4 {
            let e = world.spawn();
            world.insert_component(e, Position(i as f32, 0.0));
        }
        let query: Query<(&Position,)> = Query::new();
        let positive = query.iter(&world).count_if(|(_, (pos,))| pos.0 >= 2.0);
        assert_eq!(positive, 2);
    }
}
