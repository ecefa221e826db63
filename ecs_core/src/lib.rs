//! Core storage and execution primitives: entities, archetypes, component storage, the query
//! engine, resources, events, deferred commands, and the allocator substrate they run on. System
//! registration and scheduling live one layer up, in `ecs_systems`.

pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod memory;
pub mod query;
pub mod resource;
pub mod sparse_set;
pub mod storage;
pub mod world;

pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::command::{Command, CommandAlloc, CommandQueue, GlobalCommandAlloc};
    pub use crate::component::{Component, ComponentId, Resource, ThreadSafeResource};
    pub use crate::entity::{Entity, EntityAllocator};
    pub use crate::error::{AllocatorError, EntityError, ResourceError};
    pub use crate::event::{ClearPolicy, EventReader, EventWriter, Events};
    pub use crate::query::{Optional, Query, QueryFilter, QuerySinkExt, With, Without};
    pub use crate::resource::{Read, Resources, Write};
    pub use crate::world::World;
}
