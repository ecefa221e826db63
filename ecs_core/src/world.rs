//! `World`: owns entities, their archetype assignment, per-type component storage, resources and
//! events, and exposes the public mutation/query surface named in `spec.md` §6. Grounded on the
//! teacher's top-level `World` (`examples/0x112233-legion/src/lib.rs`), generalized from its
//! chunk-based archetype storage to this workspace's per-type sparse-set storage (`SPEC_FULL.md`
//! §4/§6/§11).

use fxhash::FxHashMap;
use tracing::{debug, trace};

use crate::archetype::{Archetype, ArchetypeId};
use crate::command::{Command, CommandQueue};
use crate::component::{Component, ComponentId, Resource};
use crate::entity::{Entity, EntityAllocator};
use crate::error::{EntityError, ResourceError};
use crate::event::{ClearPolicy, EventReader, Events};
use crate::resource::{Read, Resources, Write};
use crate::storage::ComponentRegistry;

/// World-unique entity point: which archetype it currently belongs to, if any.
#[derive(Copy, Clone, Debug)]
struct EntityLocation {
    archetype: ArchetypeId,
}

pub struct World {
    entities: EntityAllocator,
    locations: FxHashMap<Entity, EntityLocation>,
    archetypes: Vec<Archetype>,
    archetype_lookup: FxHashMap<Box<[ComponentId]>, ArchetypeId>,
    components: ComponentRegistry,
    resources: Resources,
    events: FxHashMap<std::any::TypeId, Box<dyn EventStorageErased>>,
    commands: CommandQueue,
    /// Bumped on archetype creation and on any entity-archetype move; NOT on same-archetype
    /// add/remove of a member entity. Query caches key off this (`spec.md` §4.2).
    structural_version: u64,
}

trait EventStorageErased: Send + Sync {
    fn update(&mut self);
    fn clear(&mut self);
    fn as_any(&self) -> &dyn std::any::Any;
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

impl<T: Send + Sync + 'static> EventStorageErased for Events<T> {
    fn update(&mut self) {
        Events::update(self)
    }
    fn clear(&mut self) {
        Events::clear(self)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        let mut world = World {
            entities: EntityAllocator::new(),
            locations: FxHashMap::default(),
            archetypes: Vec::new(),
            archetype_lookup: FxHashMap::default(),
            components: ComponentRegistry::new(),
            resources: Resources::new(),
            events: FxHashMap::default(),
            commands: CommandQueue::new(),
            structural_version: 0,
        };
        // The empty archetype always exists at index 0; every freshly spawned entity starts here.
        world.archetype_for(&[]);
        world
    }

    // ---- entities -----------------------------------------------------------------------

    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.allocate();
        let empty = self.archetype_for(&[]);
        self.archetypes[empty.index()].add_entity(entity);
        self.locations.insert(entity, EntityLocation { archetype: empty });
        trace!(entity = %entity, "spawned entity");
        entity
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }
        if let Some(location) = self.locations.remove(&entity) {
            self.archetypes[location.archetype.index()].remove_entity(entity);
        }
        self.components.remove_all(entity.index());
        self.entities.free(entity);
        debug!(entity = %entity, "despawned entity");
        true
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Reserves an entity id from a shared `&World`, usable immediately as a [`Command`] target.
    /// The id is not visible to [`World::is_alive`] until the next [`World::apply_commands`]
    /// folds it into the main allocator.
    pub fn reserve_entity(&self) -> Entity {
        self.entities.reserve()
    }

    // ---- components / archetype transitions ----------------------------------------------

    /// Finds the archetype with exactly `types` (sorted, deduped), creating it if this is the
    /// first time this signature has been seen. `O(k log k)` on miss, `O(1)` amortized on hit via
    /// the caller-side edge cache where available.
    fn archetype_for(&mut self, types: &[ComponentId]) -> ArchetypeId {
        let mut sorted = types.to_vec();
        sorted.sort();
        sorted.dedup();
        let key: Box<[ComponentId]> = sorted.into_boxed_slice();

        if let Some(id) = self.archetype_lookup.get(&key) {
            return *id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetypes.push(Archetype::new(id, key.to_vec()));
        self.archetype_lookup.insert(key, id);
        self.structural_version += 1;
        id
    }

    fn move_entity(&mut self, entity: Entity, target: ArchetypeId) {
        let location = *self.locations.get(&entity).expect("move_entity called on an entity with no location");
        if location.archetype == target {
            return;
        }
        self.archetypes[location.archetype.index()].remove_entity(entity);
        self.archetypes[target.index()].add_entity(entity);
        self.locations.insert(entity, EntityLocation { archetype: target });
        self.structural_version += 1;
    }

    pub fn insert_component<T: Component>(&mut self, entity: Entity, value: T) {
        if !self.entities.is_alive(entity) {
            return;
        }
        let component_id = ComponentId::of::<T>();
        let location = *self.locations.get(&entity).expect("insert_component on an entity with no location");
        let source = location.archetype;

        let target = if let Some(cached) = self.archetypes[source.index()].get_edge(component_id, true) {
            cached
        } else {
            let mut types = self.archetypes[source.index()].types().to_vec();
            types.push(component_id);
            let target = self.archetype_for(&types);
            self.archetypes[source.index()].set_edge(component_id, true, target);
            target
        };

        self.components.column_mut::<T>().insert(entity.index(), value);
        self.move_entity(entity, target);
    }

    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.remove_component_raw(entity, ComponentId::of::<T>());
        self.components.column_mut::<T>().remove(entity.index())
    }

    /// Type-erased half of [`World::remove_component`], also used by [`Command::RemoveComponent`]
    /// where the concrete type is only known inside the closure that enqueued the command.
    pub(crate) fn remove_component_raw(&mut self, entity: Entity, component_id: ComponentId) {
        if !self.entities.is_alive(entity) {
            return;
        }
        let location = match self.locations.get(&entity) {
            Some(l) => *l,
            None => return,
        };
        let source = location.archetype;
        if !self.archetypes[source.index()].has_component(component_id) {
            return;
        }

        let target = if let Some(cached) = self.archetypes[source.index()].get_edge(component_id, false) {
            cached
        } else {
            let types: Vec<ComponentId> = self.archetypes[source.index()]
                .types()
                .iter()
                .copied()
                .filter(|c| *c != component_id)
                .collect();
            let target = self.archetype_for(&types);
            self.archetypes[source.index()].set_edge(component_id, false, target);
            target
        };

        self.components.remove_component(component_id, entity.index());
        self.move_entity(entity, target);
    }

    /// Removes every component `entity` carries, moving it back to the empty archetype without
    /// destroying it. Backs `Command::ClearComponents`.
    pub fn clear_components(&mut self, entity: Entity) {
        if !self.entities.is_alive(entity) {
            return;
        }
        let location = match self.locations.get(&entity) {
            Some(l) => *l,
            None => return,
        };
        let types = self.archetypes[location.archetype.index()].types().to_vec();
        for component_id in types {
            self.components.remove_component(component_id, entity.index());
        }
        let empty = self.archetype_for(&[]);
        self.move_entity(entity, empty);
    }

    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.components.column::<T>()?.get(entity.index())
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.components.column_mut_opt::<T>()?.get_mut(entity.index())
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.components.column::<T>().map(|c| c.get(entity.index()).is_some()).unwrap_or(false)
    }

    pub fn structural_version(&self) -> u64 {
        self.structural_version
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn archetypes(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    pub fn archetype(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.index()]
    }

    // ---- resources -------------------------------------------------------------------------

    pub fn insert_resource<T: Resource>(&mut self, value: T) -> Option<T> {
        self.resources.insert(value)
    }

    /// As [`World::insert_resource`], but exempts `T` from a system's declared-access-policy
    /// assertion (`spec.md` §3): a resource that manages its own internal synchronization (e.g.
    /// wraps a `Mutex`) can be read or written by a system that never declared it.
    pub fn insert_thread_safe_resource<T: crate::component::ThreadSafeResource>(&mut self, value: T) -> Option<T> {
        self.resources.insert_thread_safe(value)
    }

    pub fn remove_resource<T: Resource>(&mut self) -> Option<T> {
        self.resources.remove::<T>()
    }

    pub fn read_resource<T: Resource>(&self) -> Result<Read<'_, T>, ResourceError> {
        self.resources.get::<T>().map(Read::new)
    }

    pub fn write_resource<T: Resource>(&self) -> Result<Write<'_, T>, ResourceError> {
        self.resources.get_mut::<T>().map(Write::new)
    }

    pub fn has_resource<T: Resource>(&self) -> bool {
        self.resources.contains::<T>()
    }

    /// Whether `type_id` was registered via [`World::insert_thread_safe_resource`]; `ecs_systems`'
    /// `SystemContext` uses this to skip the declared-access-policy assertion for exempt resources.
    pub fn resource_is_thread_safe(&self, type_id: std::any::TypeId) -> bool {
        self.resources.is_thread_safe(type_id)
    }

    // ---- events ----------------------------------------------------------------------------

    /// Registers an event type with an explicit clear policy. Idempotent: re-registering an
    /// already-registered type is a no-op (its existing buffer and policy are kept).
    pub fn register_event<T: Send + Sync + 'static>(&mut self, clear_policy: ClearPolicy) {
        self.events
            .entry(std::any::TypeId::of::<T>())
            .or_insert_with(|| Box::new(Events::<T>::new(clear_policy)));
    }

    pub fn emit_event<T: Send + Sync + 'static>(&mut self, event: T) {
        self.register_event::<T>(ClearPolicy::Automatic);
        let storage = self
            .events
            .get_mut(&std::any::TypeId::of::<T>())
            .and_then(|s| s.as_any_mut().downcast_mut::<Events<T>>())
            .expect("event storage type mismatch");
        storage.send(event);
    }

    pub fn read_events<T: Send + Sync + 'static>(&self, reader: &mut EventReader<T>) -> Vec<&T> {
        match self.events.get(&std::any::TypeId::of::<T>()) {
            Some(storage) => {
                let storage = storage.as_any().downcast_ref::<Events<T>>().expect("event storage type mismatch");
                reader.read(storage)
            }
            None => Vec::new(),
        }
    }

    /// Advances every registered event type's double buffer, every update, regardless of clear
    /// policy — `spec.md` §5's two-update visibility window depends on the swap happening on
    /// schedule. `Events::update` itself decides, per type, whether the draining buffer is
    /// actually cleared or kept around for `ClearPolicy::Manual` accumulation. Called once per
    /// `Update` cycle, after every schedule for that cycle has run.
    pub fn update_events(&mut self) {
        for storage in self.events.values_mut() {
            storage.update();
        }
    }

    /// Force-empties one event type's buffers regardless of its clear policy — the explicit
    /// `ManualClear` escape hatch for `ClearPolicy::Manual` event types, which `update_events`
    /// otherwise leaves accumulating.
    pub fn clear_events<T: Send + Sync + 'static>(&mut self) {
        self.clear_events_raw(std::any::TypeId::of::<T>());
    }

    /// Type-erased half of [`World::clear_events`], used by `Command::ClearEventsOfType` where the
    /// concrete event type is only known as a `TypeId` at command-construction time.
    pub(crate) fn clear_events_raw(&mut self, type_id: std::any::TypeId) {
        if let Some(storage) = self.events.get_mut(&type_id) {
            storage.clear();
        }
    }

    /// Force-empties every registered event type's buffers regardless of clear policy. Backs
    /// `Command::ClearEvents`.
    pub fn clear_all_events(&mut self) {
        for storage in self.events.values_mut() {
            storage.clear();
        }
    }

    // ---- commands --------------------------------------------------------------------------

    pub fn commands_mut(&mut self) -> &mut CommandQueue {
        &mut self.commands
    }

    pub fn enqueue(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Applies every command enqueued so far (both on `self.commands` and any queue merged in via
    /// `queues`), in enqueue order, then frame-updates events. Called at schedule boundaries.
    pub fn apply_commands(&mut self, queues: impl IntoIterator<Item = CommandQueue>) {
        self.entities.flush_reserved();
        let mut merged = CommandQueue::new();
        std::mem::swap(&mut merged, &mut self.commands);
        for mut queue in queues {
            merged.append(&mut queue);
        }
        let mut merged = merged;
        merged.apply(self);
    }

    pub fn checked_entity(&self, entity: Entity) -> Result<Entity, EntityError> {
        if self.entities.is_alive(entity) {
            Ok(entity)
        } else {
            Err(EntityError::NotAlive(entity))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Position(f32, f32);
    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Velocity(f32, f32);

    #[test]
    fn spawn_and_despawn() {
        let mut world = World::new();
        let e = world.spawn();
        assert!(world.is_alive(e));
        assert!(world.despawn(e));
        assert!(!world.is_alive(e));
    }

    #[test]
    fn insert_component_moves_entity_to_new_archetype() {
        let mut world = World::new();
        let e = world.spawn();
        let before = world.structural_version();
        world.insert_component(e, Position(1.0, 2.0));
        assert_eq!(world.get_component::<Position>(e), Some(&Position(1.0, 2.0)));
        assert!(world.structural_version() > before);
    }

    #[test]
    fn remove_component_moves_entity_back() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert_component(e, Position(1.0, 2.0));
        world.insert_component(e, Velocity(0.0, 0.0));
        assert_eq!(world.remove_component::<Velocity>(e), Some(Velocity(0.0, 0.0)));
        assert!(!world.has_component::<Velocity>(e));
        assert!(world.has_component::<Position>(e));
    }

    #[test]
    fn archetype_edge_cache_reused_on_repeat_transition() {
        let mut world = World::new();
        let e1 = world.spawn();
        world.insert_component(e1, Position(0.0, 0.0));
        let after_first = world.archetypes().count();

        let e2 = world.spawn();
        world.insert_component(e2, Position(1.0, 1.0));
        // Same transition (empty -> {Position}) must not create a second archetype.
        assert_eq!(world.archetypes().count(), after_first);
    }

    #[test]
    fn despawn_removes_all_components() {
        let mut world = World::new();
        let e = world.spawn();
        world.insert_component(e, Position(0.0, 0.0));
        world.despawn(e);
        assert_eq!(world.get_component::<Position>(e), None);
    }

    #[test]
    fn resources_roundtrip_through_world() {
        let mut world = World::new();
        world.insert_resource(42u32);
        assert_eq!(*world.read_resource::<u32>().unwrap(), 42);
    }

    #[test]
    fn commands_apply_in_enqueue_order() {
        let mut world = World::new();
        let e1 = world.spawn();
        let e2 = world.spawn();
        world.enqueue(Command::despawn(e1));
        world.enqueue(Command::despawn(e2));
        world.apply_commands(std::iter::empty());
        assert!(!world.is_alive(e1));
        assert!(!world.is_alive(e2));
    }

    #[test]
    fn events_visible_for_two_updates_then_dropped() {
        let mut world = World::new();
        world.emit_event::<u32>(7);
        let mut reader = EventReader::<u32>::new();
        assert_eq!(world.read_events(&mut reader), vec![&7]);
        world.update_events();
        let mut late = EventReader::<u32>::new();
        assert_eq!(world.read_events(&mut late), vec![&7]);
        world.update_events();
        let mut too_late = EventReader::<u32>::new();
        assert!(world.read_events(&mut too_late).is_empty());
    }
}
