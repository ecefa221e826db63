//! Component and resource identity.

use std::any::{Any, TypeId};
use std::fmt;

/// Marker trait for types that may be stored per-entity. Blanket-implemented for any type that
/// satisfies the storage bounds; the type carries no vtable, storage is pure data.
pub trait Component: Any + Send + Sync + 'static {}
impl<T: Any + Send + Sync + 'static> Component for T {}

/// Marker trait for world-unique, globally named data items (not per-entity).
pub trait Resource: Any + Send + Sync + 'static {}
impl<T: Any + Send + Sync + 'static> Resource for T {}

/// Opts a [`Resource`] out of system access-policy validation (`spec.md` §3, §7): a system that
/// writes an undeclared thread-safe resource is not flagged even in debug builds, since the
/// resource promises its own internal synchronization.
pub trait ThreadSafeResource: Resource {}

/// Stable per-build identity for a [`Component`] type.
///
/// `TypeId` is Rust's own compiler-assigned stable hash of a type, which satisfies the Design
/// Notes' "any hashing scheme suffices provided it is injective within one build" — no separate
/// registry is required the way a non-reflective target would need one.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ComponentId(TypeId, &'static str);

impl ComponentId {
    pub fn of<T: Component>() -> Self {
        ComponentId(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub fn name(&self) -> &'static str {
        self.1
    }

    pub(crate) fn raw(&self) -> TypeId {
        self.0
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.1)
    }
}

/// Whether a component's footprint is zero (a "tag"). Storage still tracks presence/absence via
/// the sparse set, but no bytes are held for the value.
pub fn is_tag_like<T: Component>() -> bool {
    std::mem::size_of::<T>() == 0
}
