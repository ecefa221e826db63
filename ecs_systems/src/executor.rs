//! Runs a built [`crate::schedule::Schedule`]'s systems, sequentially or across a `rayon` pool.
//! Grounded directly on the teacher's `StageExecutor::execute`/`run_recursive`
//! (`examples/0x112233-legion/src/system.rs`): dependants notified on completion via an
//! `AtomicUsize` countdown, a system becomes runnable exactly when its count reaches zero, and the
//! initial wave is every system with no dependencies at all.

use std::sync::atomic::{AtomicUsize, Ordering};

use ecs_core::command::CommandQueue;
use ecs_core::world::World;
use parking_lot::Mutex;

use crate::system::SystemStorage;

/// Abstracts how a [`crate::schedule::Schedule`]'s systems actually get run. `spec.md` §1/§9
/// treats the executor as an external collaborator: the scheduler only needs `spawn_graph`/`wait`
/// semantics, not a concrete threading model.
pub trait Executor: Send + Sync {
    /// Runs every system in `systems` respecting the dependency graph described by `dependants`/
    /// `indegree` (parallel executors may run independent systems concurrently; `order` gives a
    /// valid sequential fallback), returning each system's queued commands in registration order.
    fn run(
        &self,
        systems: &[SystemStorage],
        order: &[usize],
        dependants: &[Vec<usize>],
        indegree: &[usize],
        world: &World,
    ) -> Vec<CommandQueue>;
}

/// Runs systems one at a time in `order`, on the calling thread. Backs the `Main` schedule
/// unconditionally (`spec.md` §4.1) and is the only executor available without `par-schedule`.
pub struct SequentialExecutor;

impl Executor for SequentialExecutor {
    fn run(
        &self,
        systems: &[SystemStorage],
        order: &[usize],
        _dependants: &[Vec<usize>],
        _indegree: &[usize],
        world: &World,
    ) -> Vec<CommandQueue> {
        let mut queues: Vec<CommandQueue> = (0..systems.len()).map(|_| CommandQueue::default()).collect();
        for &i in order {
            queues[i] = systems[i].run(world);
        }
        queues
    }
}

/// Dependency-driven parallel executor over a `rayon::ThreadPool`, following the teacher's
/// `StageExecutor` cascade: every system with zero outstanding dependencies runs immediately;
/// completing a system decrements its dependants' counts and recurses into any that reach zero.
#[cfg(feature = "par-schedule")]
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "par-schedule")]
impl RayonExecutor {
    pub fn new(num_threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build()?;
        Ok(Self { pool })
    }

    fn run_recursive(
        &self,
        i: usize,
        systems: &[SystemStorage],
        dependants: &[Vec<usize>],
        awaiting: &[AtomicUsize],
        world: &World,
        queues: &Mutex<Vec<CommandQueue>>,
    ) {
        let queue = systems[i].run(world);
        queues.lock()[i] = queue;

        rayon::scope(|scope| {
            for &dep in &dependants[i] {
                if awaiting[dep].fetch_sub(1, Ordering::SeqCst) == 1 {
                    scope.spawn(move |_| self.run_recursive(dep, systems, dependants, awaiting, world, queues));
                }
            }
        });
    }
}

#[cfg(feature = "par-schedule")]
impl Executor for RayonExecutor {
    fn run(
        &self,
        systems: &[SystemStorage],
        _order: &[usize],
        dependants: &[Vec<usize>],
        indegree: &[usize],
        world: &World,
    ) -> Vec<CommandQueue> {
        if systems.is_empty() {
            return Vec::new();
        }
        let awaiting: Vec<AtomicUsize> = indegree.iter().map(|&n| AtomicUsize::new(n)).collect();
        let queues = Mutex::new((0..systems.len()).map(|_| CommandQueue::default()).collect::<Vec<_>>());

        self.pool.install(|| {
            rayon::scope(|scope| {
                for i in 0..systems.len() {
                    if indegree[i] == 0 {
                        scope.spawn(|_| self.run_recursive(i, systems, dependants, &awaiting, world, &queues));
                    }
                }
            });
        });

        queues.into_inner()
    }
}
