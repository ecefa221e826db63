//! Archetype-based entity component system with a parallel, conflict-derived scheduler.
//!
//! This crate is a thin facade over [`ecs_core`] (entities, archetypes, component storage, the
//! query engine, resources, events, commands, memory allocators) and [`ecs_systems`] (system
//! registration, schedule DAG construction, executors), plus the [`app`] seam a hosting
//! application drives both through.

pub use ecs_core;
pub use ecs_systems;

pub mod app;

pub mod prelude {
    pub use ecs_core::prelude::*;
    pub use ecs_systems::prelude::*;

    pub use crate::app::{App, Module};
}
