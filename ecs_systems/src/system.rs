//! A single registered system: its declared [`Access`], and the boxed closure the scheduler
//! invokes once per [`ecs_core::world::World`] per cycle. Grounded on the teacher's
//! `SystemBuilder`/`System<R, Q, F>` split (`examples/0x112233-legion/src/system.rs`) and
//! `examples/original_source/.../app/details/scheduler.hpp`'s `SystemStorage`/`SystemInfo`
//! record, simplified from the teacher's cons-list query/resource inference to explicit
//! `.reads_component::<T>()`/`.writes_resource::<T>()` declarations on the builder (see
//! `DESIGN.md`'s Open Question on automatic access inference).

use std::any::TypeId;

use ecs_core::component::{Component, Resource};

use crate::access::Access;
use crate::context::SystemContext;

/// Static metadata about a registered system: its name (used in logging and cycle-detection
/// error messages) and its declared read/write footprint (the raw material the scheduler derives
/// conflict edges from).
pub struct SystemInfo {
    pub name: String,
    pub access: Access,
}

/// A registered system, ready to be placed into a [`crate::schedule::Schedule`].
pub struct SystemStorage {
    info: SystemInfo,
    body: Box<dyn Fn(&mut SystemContext) + Send + Sync>,
}

impl SystemStorage {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn access(&self) -> &Access {
        &self.info.access
    }

    /// Runs this system against a shared `&World`, returning the commands it queued. The caller
    /// (an [`crate::executor::Executor`]) is responsible for applying every system's queue in
    /// registration order at the schedule boundary.
    pub fn run(&self, world: &ecs_core::world::World) -> ecs_core::command::CommandQueue {
        tracing::trace!(system = %self.info.name, "running system");
        let mut ctx = SystemContext::for_system(world, &self.info.name, self.info.access.clone());
        (self.body)(&mut ctx);
        ctx.take_commands()
    }
}

/// Fluent builder for a [`SystemStorage`], grounded on the teacher's `SystemBuilder::new(name)
/// .read_resource::<T>()....build(closure)` chain.
pub struct SystemBuilder {
    name: String,
    access: Access,
}

impl SystemBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: Access::default(),
        }
    }

    pub fn read_resource<T: Resource>(mut self) -> Self {
        self.access.read_resources.push(TypeId::of::<T>());
        self
    }

    pub fn write_resource<T: Resource>(mut self) -> Self {
        self.access.write_resources.push(TypeId::of::<T>());
        self
    }

    pub fn read_component<T: Component>(mut self) -> Self {
        self.access.read_components.push(ecs_core::component::ComponentId::of::<T>());
        self
    }

    pub fn write_component<T: Component>(mut self) -> Self {
        self.access.write_components.push(ecs_core::component::ComponentId::of::<T>());
        self
    }

    pub fn build(self, body: impl Fn(&mut SystemContext) + Send + Sync + 'static) -> SystemStorage {
        SystemStorage {
            info: SystemInfo { name: self.name, access: self.access },
            body: Box::new(body),
        }
    }
}
