//! Wraps an [`Allocator`] strategy and transparently creates additional backing instances when
//! the current one is exhausted (`spec.md` §9.2). Grounded on
//! `examples/original_source/.../memory/growable_allocator.hpp`: try every existing instance
//! under a shared (read) lock first; only escalate to an exclusive lock, re-check, and then grow
//! if every instance is genuinely full. Per-system scratch allocators are a
//! `GrowableAllocator<FrameAllocator>` reset at the end of every frame (`spec.md` §9.3).

use parking_lot::RwLock;

use super::{AllocationResult, Allocator, AllocatorStats};
use crate::error::AllocatorError;

pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

struct State<A> {
    instances: Vec<A>,
    next_capacity: usize,
}

pub struct GrowableAllocator<A> {
    initial_capacity: usize,
    growth_factor: f64,
    max_instances: usize,
    state: RwLock<State<A>>,
}

impl<A: Allocator> GrowableAllocator<A> {
    /// `max_instances == 0` means unbounded growth.
    pub fn new(initial_capacity: usize, growth_factor: f64, max_instances: usize, make: impl Fn(usize) -> A) -> Self {
        assert!(initial_capacity > 0, "GrowableAllocator initial_capacity must be greater than 0");
        assert!(growth_factor > 1.0, "GrowableAllocator growth_factor must be greater than 1.0");
        let first = make(initial_capacity);
        Self {
            initial_capacity,
            growth_factor,
            max_instances,
            state: RwLock::new(State {
                instances: vec![first],
                next_capacity: initial_capacity,
            }),
        }
    }

    pub fn can_grow(&self) -> bool {
        let state = self.state.read();
        self.max_instances == 0 || state.instances.len() < self.max_instances
    }

    pub fn instance_count(&self) -> usize {
        self.state.read().instances.len()
    }

    pub fn initial_capacity(&self) -> usize {
        self.initial_capacity
    }

    pub fn total_capacity(&self) -> usize {
        self.state.read().instances.iter().map(|a| a.capacity()).sum()
    }

    /// Allocates, growing by creating a new backing instance if every existing one is full.
    /// Returns [`AllocatorError::GrowthCapReached`] only when growth was actually required and
    /// `max_instances` forbids it; a request satisfiable by an existing instance never errors.
    pub fn try_allocate(
        &self,
        size: usize,
        align: usize,
        make: impl Fn(usize) -> A,
    ) -> Result<AllocationResult, AllocatorError> {
        {
            let state = self.state.read();
            for instance in &state.instances {
                let result = instance.allocate(size, align);
                if result.is_ok() {
                    return Ok(result);
                }
            }
        }

        let mut state = self.state.write();
        for instance in &state.instances {
            let result = instance.allocate(size, align);
            if result.is_ok() {
                return Ok(result);
            }
        }

        if self.max_instances > 0 && state.instances.len() >= self.max_instances {
            return Err(AllocatorError::GrowthCapReached {
                max_instances: self.max_instances,
            });
        }

        let mut new_capacity = (state.next_capacity as f64 * self.growth_factor) as usize;
        if new_capacity < size {
            new_capacity = size + size / 2;
        }
        let new_instance = make(new_capacity);
        let result = new_instance.allocate(size, align);
        state.instances.push(new_instance);
        state.next_capacity = new_capacity;

        if result.is_ok() {
            Ok(result)
        } else {
            Err(AllocatorError::OutOfMemory { size, align })
        }
    }

    pub fn owns(&self, ptr: *const u8) -> bool {
        self.state.read().instances.iter().any(|a| a.owns(ptr))
    }

    pub fn reset(&self) {
        let mut state = self.state.write();
        for instance in &state.instances {
            instance.reset();
        }
        state.instances.truncate(1);
        state.next_capacity = self.initial_capacity;
    }

    pub fn stats(&self) -> AllocatorStats {
        let state = self.state.read();
        let mut combined = AllocatorStats::default();
        for instance in &state.instances {
            combined += instance.stats();
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::FrameAllocator;

    #[test]
    fn allocates_from_first_instance_without_growing() {
        let growable = GrowableAllocator::new(128, 2.0, 0, FrameAllocator::new);
        let result = growable.try_allocate(16, 8, FrameAllocator::new).unwrap();
        assert!(result.is_ok());
        assert_eq!(growable.instance_count(), 1);
    }

    #[test]
    fn grows_when_exhausted() {
        let growable = GrowableAllocator::new(16, 2.0, 0, FrameAllocator::new);
        growable.try_allocate(16, 8, FrameAllocator::new).unwrap();
        let second = growable.try_allocate(16, 8, FrameAllocator::new).unwrap();
        assert!(second.is_ok());
        assert_eq!(growable.instance_count(), 2);
    }

    #[test]
    fn respects_max_instances_cap() {
        let growable = GrowableAllocator::new(8, 2.0, 1, FrameAllocator::new);
        growable.try_allocate(8, 8, FrameAllocator::new).unwrap();
        let err = growable.try_allocate(8, 8, FrameAllocator::new);
        assert!(matches!(err, Err(AllocatorError::GrowthCapReached { max_instances: 1 })));
    }

    #[test]
    fn reset_drops_all_but_first_instance() {
        let growable = GrowableAllocator::new(16, 2.0, 0, FrameAllocator::new);
        growable.try_allocate(16, 8, FrameAllocator::new).unwrap();
        growable.try_allocate(16, 8, FrameAllocator::new).unwrap();
        assert_eq!(growable.instance_count(), 2);
        growable.reset();
        assert_eq!(growable.instance_count(), 1);
    }
}
