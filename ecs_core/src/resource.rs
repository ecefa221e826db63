//! World-unique resource storage.
//!
//! Grounded on `examples/0x112233-legion/src/resource.rs`'s `Resources` map keyed by `TypeId`,
//! guarded per-entry by an interior-mutability cell (the teacher's own `borrow::AtomicRefCell`
//! module is absent from the retrieved snapshot; `atomic_refcell` is the published crate
//! implementing the same `Ref`/`RefMut` runtime-checked-borrow pattern, see `SPEC_FULL.md` §9).

use std::any::TypeId;
use std::ops::{Deref, DerefMut};

use atomic_refcell::{AtomicRefCell, AtomicRef, AtomicRefMut};
use fxhash::FxHashMap;

use crate::component::{Resource, ThreadSafeResource};
use crate::error::ResourceError;

trait ResourceCell: Send + Sync {
    fn as_any(&self) -> &dyn std::any::Any;
    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any>;
}

impl<T: Resource> ResourceCell for AtomicRefCell<T> {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

/// World-unique storage keyed by resource type. Each slot is independently borrow-checked at
/// runtime, so two systems may concurrently borrow two different resources (or immutably borrow
/// the same one) without the `Resources` map itself needing a lock per access.
#[derive(Default)]
pub struct Resources {
    slots: FxHashMap<TypeId, Box<dyn ResourceCell>>,
    /// Types inserted via [`Resources::insert_thread_safe`]: exempt from a system's declared-
    /// access-policy assertion (`spec.md` §3) since they carry their own internal synchronization.
    thread_safe: std::collections::HashSet<TypeId>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Resource>(&mut self, value: T) -> Option<T> {
        let prior = self.remove::<T>();
        self.slots.insert(TypeId::of::<T>(), Box::new(AtomicRefCell::new(value)));
        prior
    }

    /// As [`Resources::insert`], but marks `T` exempt from the access-policy assertion any system
    /// accessing it would otherwise have to satisfy. Requires `T: ThreadSafeResource` so only a
    /// resource that has explicitly opted in this way can be registered exempt.
    pub fn insert_thread_safe<T: ThreadSafeResource>(&mut self, value: T) -> Option<T> {
        let prior = self.insert(value);
        self.thread_safe.insert(TypeId::of::<T>());
        prior
    }

    pub fn remove<T: Resource>(&mut self) -> Option<T> {
        let boxed = self.slots.remove(&TypeId::of::<T>())?;
        self.thread_safe.remove(&TypeId::of::<T>());
        boxed
            .into_any()
            .downcast::<AtomicRefCell<T>>()
            .ok()
            .map(|cell| cell.into_inner())
    }

    pub fn contains<T: Resource>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Whether the resource currently registered under `type_id` was inserted via
    /// [`Resources::insert_thread_safe`]. `false` for a `type_id` with nothing registered.
    pub fn is_thread_safe(&self, type_id: TypeId) -> bool {
        self.thread_safe.contains(&type_id)
    }

    pub fn get<T: Resource>(&self) -> Result<AtomicRef<'_, T>, ResourceError> {
        let cell = self
            .slots
            .get(&TypeId::of::<T>())
            .ok_or_else(ResourceError::missing::<T>)?;
        let cell = cell
            .as_any()
            .downcast_ref::<AtomicRefCell<T>>()
            .expect("resource type mismatch");
        Ok(cell.borrow())
    }

    pub fn get_mut<T: Resource>(&self) -> Result<AtomicRefMut<'_, T>, ResourceError> {
        let cell = self
            .slots
            .get(&TypeId::of::<T>())
            .ok_or_else(ResourceError::missing::<T>)?;
        let cell = cell
            .as_any()
            .downcast_ref::<AtomicRefCell<T>>()
            .expect("resource type mismatch");
        Ok(cell.borrow_mut())
    }
}

/// Read-only handle to a resource, held for the duration of a system's execution.
pub struct Read<'a, T: Resource>(AtomicRef<'a, T>);

impl<'a, T: Resource> Read<'a, T> {
    pub(crate) fn new(r: AtomicRef<'a, T>) -> Self {
        Self(r)
    }
}

impl<'a, T: Resource> Deref for Read<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

/// Mutable handle to a resource, held for the duration of a system's execution.
pub struct Write<'a, T: Resource>(AtomicRefMut<'a, T>);

impl<'a, T: Resource> Write<'a, T> {
    pub(crate) fn new(w: AtomicRefMut<'a, T>) -> Self {
        Self(w)
    }
}

impl<'a, T: Resource> Deref for Write<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<'a, T: Resource> DerefMut for Write<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct FrameCount(u64);

    struct AssetServer(std::sync::Mutex<u32>);
    impl ThreadSafeResource for AssetServer {}

    #[test]
    fn insert_get_roundtrip() {
        let mut res = Resources::new();
        res.insert(FrameCount(0));
        assert_eq!(*res.get::<FrameCount>().unwrap(), FrameCount(0));
    }

    #[test]
    fn get_mut_mutates_in_place() {
        let mut res = Resources::new();
        res.insert(FrameCount(0));
        res.get_mut::<FrameCount>().unwrap().0 += 1;
        assert_eq!(res.get::<FrameCount>().unwrap().0, 1);
    }

    #[test]
    fn missing_resource_errors() {
        let res = Resources::new();
        assert!(res.get::<FrameCount>().is_err());
    }

    #[test]
    fn remove_returns_owned_value() {
        let mut res = Resources::new();
        res.insert(FrameCount(7));
        assert_eq!(res.remove::<FrameCount>(), Some(FrameCount(7)));
        assert!(!res.contains::<FrameCount>());
    }

    #[test]
    fn ordinary_insert_is_not_thread_safe() {
        let mut res = Resources::new();
        res.insert(FrameCount(0));
        assert!(!res.is_thread_safe(TypeId::of::<FrameCount>()));
    }

    #[test]
    fn insert_thread_safe_marks_the_type_exempt() {
        let mut res = Resources::new();
        res.insert_thread_safe(AssetServer(std::sync::Mutex::new(0)));
        assert!(res.is_thread_safe(TypeId::of::<AssetServer>()));
    }

    #[test]
    fn removing_a_thread_safe_resource_clears_the_flag() {
        let mut res = Resources::new();
        res.insert_thread_safe(AssetServer(std::sync::Mutex::new(0)));
        res.remove::<AssetServer>();
        assert!(!res.is_thread_safe(TypeId::of::<AssetServer>()));
    }
}
