//! Per-invocation handle a system body runs with: read access to the `World`, its own deferred
//! command queue, and its own scratch allocator (`spec.md` §6, `SPEC_FULL.md` §13). Grounded on
//! the teacher's `CommandBuffer`-per-system pattern (`examples/0x112233-legion/src/system.rs`)
//! and `examples/original_source/.../app/details/scheduler.hpp`'s per-system frame allocator.

use ecs_core::command::{Command, CommandAlloc, CommandQueue, GlobalCommandAlloc};
use ecs_core::component::{Component, Resource};
use ecs_core::entity::Entity;
use ecs_core::error::ResourceError;
use ecs_core::event::EventReader;
use ecs_core::memory::{AllocationResult, FrameAllocator, GrowableAllocator};
use ecs_core::query::{Query, QueryFilter, QueryTuple};
use ecs_core::resource::{Read, Write};
use ecs_core::world::World;

use crate::access::Access;

const DEFAULT_SCRATCH_CAPACITY: usize = 64 * 1024;

/// Per-entity view over a [`SystemContext`]'s command queue: every enqueued command already
/// carries `entity`, so callers don't repeat it. Generic over the same backing-storage strategy
/// `A` as the [`CommandQueue`] it borrows.
pub struct EntityCommands<'a, A: CommandAlloc = GlobalCommandAlloc> {
    entity: Entity,
    queue: &'a mut CommandQueue<A>,
}

impl<'a, A: CommandAlloc> EntityCommands<'a, A> {
    pub fn insert<T: Component>(&mut self, value: T) -> &mut Self {
        self.queue.push(Command::insert(self.entity, value));
        self
    }

    /// Leaves an existing component of the same type untouched instead of replacing it.
    pub fn try_insert<T: Component>(&mut self, value: T) -> &mut Self {
        self.queue.push(Command::try_insert(self.entity, value));
        self
    }

    pub fn remove<T: Component>(&mut self) -> &mut Self {
        self.queue.push(Command::remove::<T>(self.entity));
        self
    }

    pub fn try_remove<T: Component>(&mut self) -> &mut Self {
        self.queue.push(Command::try_remove::<T>(self.entity));
        self
    }

    /// Removes every component this entity carries without destroying it.
    pub fn clear_components(&mut self) -> &mut Self {
        self.queue.push(Command::clear_components(self.entity));
        self
    }

    pub fn despawn(&mut self) {
        self.queue.push(Command::despawn(self.entity));
    }

    /// Tolerant form of [`EntityCommands::despawn`]: a no-op if the entity is already dead.
    pub fn try_despawn(&mut self) {
        self.queue.push(Command::try_destroy_entity(self.entity));
    }
}

/// The handle a system body actually runs with. Borrows the world read-only: structural
/// mutations and event emission go through `self.commands` and apply at the next schedule
/// boundary, which is what lets the scheduler run systems with disjoint declared [`Access`](
/// crate::access::Access) concurrently even though every one of them "sees" the same `&World`.
pub struct SystemContext<'w> {
    world: &'w World,
    commands: CommandQueue,
    scratch: GrowableAllocator<FrameAllocator>,
    access: Access,
    system_name: String,
}

impl<'w> SystemContext<'w> {
    pub fn new(world: &'w World) -> Self {
        Self::with_scratch_capacity(world, DEFAULT_SCRATCH_CAPACITY)
    }

    pub fn with_scratch_capacity(world: &'w World, capacity: usize) -> Self {
        Self {
            world,
            commands: CommandQueue::new(),
            scratch: GrowableAllocator::new(capacity, 2.0, 0, FrameAllocator::new),
            access: Access::default(),
            system_name: String::from("<ad-hoc>"),
        }
    }

    /// Used by [`crate::system::SystemStorage::run`], which knows the system's name and declared
    /// [`Access`] and wants every resource/component touch checked against it (`spec.md` §3's
    /// "reading outside the policy is a programmer error" assertion).
    pub(crate) fn for_system(world: &'w World, name: &str, access: Access) -> Self {
        Self {
            system_name: name.to_string(),
            access,
            ..Self::new(world)
        }
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn query<Q: QueryTuple, F: QueryFilter>(&self) -> Query<Q, F> {
        self.assert_component_access_declared::<Q>();
        Query::new()
    }

    /// Same as [`SystemContext::query`], named separately so a system that only ever calls this
    /// one documents at the call site that it declared no mutable component access.
    pub fn read_only_query<Q: QueryTuple, F: QueryFilter>(&self) -> Query<Q, F> {
        debug_assert!(
            Q::write_ids().is_empty(),
            "system '{}' used read_only_query with a query tuple that includes &mut access",
            self.system_name
        );
        self.assert_component_access_declared::<Q>();
        Query::new()
    }

    fn assert_component_access_declared<Q: QueryTuple>(&self) {
        let write_ids = Q::write_ids();
        for id in Q::component_ids() {
            let mutable = write_ids.contains(&id);
            let declared = if mutable {
                self.access.write_components.contains(&id)
            } else {
                self.access.read_components.contains(&id) || self.access.write_components.contains(&id)
            };
            debug_assert!(
                declared,
                "system '{}' queried component '{}' without declaring it in its Access",
                self.system_name,
                id.name()
            );
        }
    }

    fn assert_resource_access_declared<T: Resource>(&self, mutable: bool) {
        let type_id = std::any::TypeId::of::<T>();
        if self.world.resource_is_thread_safe(type_id) {
            return;
        }
        let declared = if mutable {
            self.access.write_resources.contains(&type_id)
        } else {
            self.access.read_resources.contains(&type_id) || self.access.write_resources.contains(&type_id)
        };
        debug_assert!(
            declared,
            "system '{}' accessed resource '{}' without declaring it in its Access",
            self.system_name,
            std::any::type_name::<T>()
        );
    }

    pub fn commands(&mut self) -> &mut CommandQueue {
        &mut self.commands
    }

    pub fn entity_commands(&mut self, entity: Entity) -> EntityCommands<'_> {
        EntityCommands { entity, queue: &mut self.commands }
    }

    pub fn reserve_entity(&mut self) -> Entity {
        self.world.reserve_entity()
    }

    /// Takes this invocation's accumulated commands, leaving an empty queue behind. Called by the
    /// scheduler once the system body returns, merged with every other system's queue in
    /// registration order before `World::apply_commands` runs.
    pub fn take_commands(&mut self) -> CommandQueue {
        std::mem::take(&mut self.commands)
    }

    pub fn read_resource<T: Resource>(&self) -> Result<Read<'_, T>, ResourceError> {
        self.assert_resource_access_declared::<T>(false);
        self.world.read_resource::<T>()
    }

    pub fn write_resource<T: Resource>(&self) -> Result<Write<'_, T>, ResourceError> {
        self.assert_resource_access_declared::<T>(true);
        self.world.write_resource::<T>()
    }

    /// Queues an event emission for application at the next schedule boundary (`spec.md` §5);
    /// see [`Command::emit_event`].
    pub fn emit_event<E: Send + Sync + 'static>(&mut self, event: E) {
        self.commands.push(Command::emit_event(event));
    }

    pub fn read_events<E: Send + Sync + 'static>(&self, reader: &mut EventReader<E>) -> Vec<&E> {
        self.world.read_events(reader)
    }

    /// This invocation's scratch allocator: reset to empty by the scheduler at the start of every
    /// frame, so allocations made here never outlive the system call that made them.
    pub fn frame_allocator(&self) -> &GrowableAllocator<FrameAllocator> {
        &self.scratch
    }

    /// Reserves space for one `T` out of this invocation's scratch allocator without constructing
    /// or initializing it. Returns `None` if the allocator is exhausted and growth is capped.
    pub fn make_frame_allocation<T>(&self) -> Option<AllocationResult> {
        self.scratch
            .try_allocate(std::mem::size_of::<T>(), std::mem::align_of::<T>(), FrameAllocator::new)
            .ok()
            .filter(AllocationResult::is_ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecs_core::component::ThreadSafeResource;

    struct GameTime(f32);

    #[test]
    fn write_resource_with_declared_write_access_succeeds() {
        let mut world = World::new();
        world.insert_resource(GameTime(0.0));
        let access = Access { write_resources: vec![std::any::TypeId::of::<GameTime>()], ..Default::default() };
        let ctx = SystemContext::for_system(&world, "TestSystem", access);
        (*ctx.write_resource::<GameTime>().unwrap()).0 = 1.0;
        assert_eq!((*ctx.read_resource::<GameTime>().unwrap()).0, 1.0);
    }

    #[test]
    fn read_resource_with_only_write_access_declared_still_succeeds() {
        let mut world = World::new();
        world.insert_resource(GameTime(2.5));
        let access = Access { write_resources: vec![std::any::TypeId::of::<GameTime>()], ..Default::default() };
        let ctx = SystemContext::for_system(&world, "TestSystem", access);
        assert_eq!((*ctx.read_resource::<GameTime>().unwrap()).0, 2.5);
    }

    #[test]
    #[should_panic(expected = "without declaring it in its Access")]
    fn write_resource_without_declared_access_panics_in_debug() {
        let mut world = World::new();
        world.insert_resource(GameTime(0.0));
        let ctx = SystemContext::for_system(&world, "TestSystem", Access::default());
        let _ = ctx.write_resource::<GameTime>();
    }

    struct AssetServer(std::sync::Mutex<u32>);
    impl ThreadSafeResource for AssetServer {}

    #[test]
    fn thread_safe_resource_bypasses_the_declared_access_check() {
        let mut world = World::new();
        world.insert_thread_safe_resource(AssetServer(std::sync::Mutex::new(0)));
        let ctx = SystemContext::for_system(&world, "TestSystem", Access::default());
        assert!(ctx.write_resource::<AssetServer>().is_ok());
    }

    #[derive(Debug, PartialEq, Clone, Copy)]
    struct Position(f32);

    #[test]
    fn query_with_declared_component_access_succeeds() {
        use ecs_core::component::ComponentId;

        let mut world = World::new();
        let e = world.spawn();
        world.insert_component(e, Position(1.0));
        let access = Access { read_components: vec![ComponentId::of::<Position>()], ..Default::default() };
        let ctx = SystemContext::for_system(&world, "TestSystem", access);
        let query = ctx.query::<(&Position,), ()>();
        assert_eq!(query.iter(ctx.world()).count(), 1);
    }

    #[test]
    #[should_panic(expected = "without declaring it in its Access")]
    fn query_without_declared_component_access_panics_in_debug() {
        let world = World::new();
        let ctx = SystemContext::for_system(&world, "TestSystem", Access::default());
        let _ = ctx.query::<(&Position,), ()>();
    }
}
