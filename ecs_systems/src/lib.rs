//! System registration, scheduling, and execution built on top of `ecs_core::World`: declared
//! read/write [`access::Access`], a persistent named DAG ([`schedule`]) built from explicit,
//! set-level, and access-conflict edges, and a pluggable [`executor::Executor`].

pub mod access;
pub mod context;
pub mod executor;
pub mod schedule;
pub mod set;
pub mod system;

pub mod prelude {
    pub use crate::access::Access;
    pub use crate::context::{EntityCommands, SystemContext};
    pub use crate::executor::{Executor, SequentialExecutor};
    #[cfg(feature = "par-schedule")]
    pub use crate::executor::RayonExecutor;
    pub use crate::schedule::{Schedule, ScheduleBuilder, ScheduleError, ScheduleRegistry};
    pub use crate::set::SetId;
    pub use crate::system::{SystemBuilder, SystemInfo, SystemStorage};
}
