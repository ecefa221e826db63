//! Error types for `ecs_core`, following the teacher's use of `thiserror` for enum-shaped error
//! types at every public fallible boundary.

use thiserror::Error;

use crate::entity::Entity;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource {type_name} is not present in the world")]
    Missing { type_name: &'static str },
}

impl ResourceError {
    pub fn missing<T: crate::component::Resource>() -> Self {
        ResourceError::Missing {
            type_name: std::any::type_name::<T>(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("entity {0} does not exist or has already been destroyed")]
    NotAlive(Entity),
}

#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("allocation of {size} bytes (align {align}) failed: arena exhausted")]
    OutOfMemory { size: usize, align: usize },
    #[error("growable allocator reached its configured cap of {max_instances} backing blocks")]
    GrowthCapReached { max_instances: usize },
    #[error("pointer does not belong to this allocator")]
    ForeignPointer,
}
