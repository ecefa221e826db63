//! Builds a persistent, named system DAG and runs it (`spec.md` §4.1). Grounded on the teacher's
//! `StageExecutor::new` dependency-derivation pass (`examples/0x112233-legion/src/system.rs`,
//! conflict edges from `resource_last_mutated`/`component_mutated` maps) and its successor
//! `Executor`/`Runnable` design (`examples/other_examples/1894d816_..._bevy_legion-src-schedule.rs.rs`),
//! extended per `SPEC_FULL.md` §11 to a graph built once from four edge sources in order —
//! explicit `before`/`after`, set-level `before`/`after`, then access-conflict edges with a
//! registration-order tie-break — followed by DFS cycle detection and a Kahn's-algorithm
//! topological sort using a FIFO ready queue for determinism.

use bit_set::BitSet;
use fxhash::FxHashMap;
use thiserror::Error;

use ecs_core::command::CommandQueue;
use ecs_core::world::World;

use crate::executor::{Executor, SequentialExecutor};
use crate::set::SetRegistry;
use crate::system::SystemStorage;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("cycle detected in system dependency graph at system '{system}'")]
    Cycle { system: String },
}

/// Declares a system-level ordering edge directly, bypassing sets (`spec.md` §4.1
/// `RegisterOrdering`).
pub struct ScheduleBuilder {
    systems: Vec<SystemStorage>,
    sets: SetRegistry,
    explicit_before: Vec<(usize, usize)>,
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            sets: SetRegistry::new(),
            explicit_before: Vec::new(),
        }
    }

    /// Registers a system, returning its index for use with `system_runs_before`/
    /// `add_system_to_set`.
    pub fn add_system(&mut self, system: SystemStorage) -> usize {
        self.systems.push(system);
        self.systems.len() - 1
    }

    pub fn add_system_to_set(&mut self, system: usize, set: impl Into<crate::set::SetId>) -> &mut Self {
        self.sets.add_system_to_set(system, set);
        self
    }

    pub fn set_runs_before(&mut self, before: impl Into<crate::set::SetId>, after: impl Into<crate::set::SetId>) -> &mut Self {
        self.sets.set_runs_before(before, after);
        self
    }

    pub fn set_runs_after(&mut self, after: impl Into<crate::set::SetId>, before: impl Into<crate::set::SetId>) -> &mut Self {
        self.sets.set_runs_after(after, before);
        self
    }

    pub fn system_runs_before(&mut self, a: usize, b: usize) -> &mut Self {
        self.explicit_before.push((a, b));
        self
    }

    pub fn system_runs_after(&mut self, a: usize, b: usize) -> &mut Self {
        self.explicit_before.push((b, a));
        self
    }

    /// Builds the final graph: explicit edges, then set edges, then access-conflict edges
    /// (registration-order tie-break, i.e. the earlier-registered system of a conflicting pair
    /// always gets the "runs before" edge, and only when no explicit/set ordering already relates
    /// the pair, direct or transitive), DFS cycle-checked, then reduced to a deterministic
    /// topological order via Kahn's algorithm with a FIFO ready queue.
    pub fn build(self) -> Result<Schedule, ScheduleError> {
        let n = self.systems.len();
        let mut ordering_edges: Vec<(usize, usize)> = self.explicit_before.clone();
        ordering_edges.extend(self.sets.expand_edges());

        // A conflict edge is only added between a pair with no existing ordering relationship.
        // Without this check, a pair that's already explicitly/set-ordered one way could get a
        // second, opposite-direction edge from the conflict pass's registration-order tie-break,
        // producing a spurious 2-cycle between two systems that were never actually unordered.
        let reachable = transitive_closure(n, &ordering_edges);

        let mut edges = ordering_edges;
        for i in 0..n {
            for j in (i + 1)..n {
                if self.systems[i].access().conflicts_with(self.systems[j].access())
                    && !reachable[i].contains(j)
                    && !reachable[j].contains(i)
                {
                    edges.push((i, j));
                }
            }
        }

        let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (a, b) in edges {
            dependants[a].push(b);
        }
        for adj in &mut dependants {
            adj.sort_unstable();
            adj.dedup();
        }
        // indegree derived after dedup, since the edge list above may contain duplicates (e.g.
        // the same pair declared both explicitly and via a set edge)
        let mut indegree = vec![0usize; n];
        for adj in &dependants {
            for &b in adj {
                indegree[b] += 1;
            }
        }

        let names: Vec<&str> = self.systems.iter().map(|s| s.name()).collect();
        detect_cycle(&names, &dependants)?;

        let order = kahn_topological_order(n, &dependants, &mut indegree.clone());

        Ok(Schedule {
            systems: self.systems,
            order,
            dependants,
            indegree,
        })
    }
}

/// Full reachability of the `edges` graph: `result[i]` contains every node reachable from `i`,
/// direct or transitive. Used to decide whether an access-conflict pair is already ordered before
/// a tie-break edge would be added for it.
fn transitive_closure(n: usize, edges: &[(usize, usize)]) -> Vec<BitSet> {
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(a, b) in edges {
        adj[a].push(b);
    }

    let mut reach = vec![BitSet::with_capacity(n); n];
    for start in 0..n {
        let mut stack = adj[start].clone();
        while let Some(node) = stack.pop() {
            if reach[start].contains(node) {
                continue;
            }
            reach[start].insert(node);
            for &next in &adj[node] {
                if !reach[start].contains(next) {
                    stack.push(next);
                }
            }
        }
    }
    reach
}

/// DFS coloring cycle check; `names` is used only to name the offending node in the error.
fn detect_cycle(names: &[&str], dependants: &[Vec<usize>]) -> Result<(), ScheduleError> {
    let n = names.len();
    let mut visited = BitSet::with_capacity(n);
    let mut on_stack = BitSet::with_capacity(n);

    fn visit(
        node: usize,
        dependants: &[Vec<usize>],
        visited: &mut BitSet,
        on_stack: &mut BitSet,
    ) -> Option<usize> {
        if on_stack.contains(node) {
            return Some(node);
        }
        if visited.contains(node) {
            return None;
        }
        visited.insert(node);
        on_stack.insert(node);
        for &next in &dependants[node] {
            if let Some(cycle_at) = visit(next, dependants, visited, on_stack) {
                return Some(cycle_at);
            }
        }
        on_stack.remove(node);
        None
    }

    for node in 0..n {
        if let Some(cycle_at) = visit(node, dependants, &mut visited, &mut on_stack) {
            return Err(ScheduleError::Cycle { system: names[cycle_at].to_string() });
        }
    }
    Ok(())
}

/// Kahn's algorithm with a FIFO ready queue: ties among simultaneously-ready systems are broken
/// by registration order, so the resulting order is fully deterministic run to run.
fn kahn_topological_order(n: usize, dependants: &[Vec<usize>], indegree: &mut [usize]) -> Vec<usize> {
    let mut ready: std::collections::VecDeque<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &next in &dependants[node] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push_back(next);
            }
        }
    }
    order
}

/// A built, ready-to-run system graph. `Main` (per `spec.md` §4.1) always runs through
/// [`SequentialExecutor`] regardless of feature flags; other named schedules may run through a
/// `par-schedule` [`crate::executor::RayonExecutor`] instead.
pub struct Schedule {
    pub(crate) systems: Vec<SystemStorage>,
    pub(crate) order: Vec<usize>,
    pub(crate) dependants: Vec<Vec<usize>>,
    pub(crate) indegree: Vec<usize>,
}

impl Schedule {
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Deterministic topological order systems would run in under a sequential executor.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn system_name(&self, index: usize) -> &str {
        self.systems[index].name()
    }

    /// Runs every system once, applies every queued command in registration order, then
    /// frame-updates events. Uses `executor` to decide sequential vs. parallel execution.
    pub fn run_once(&self, world: &mut World, executor: &dyn Executor) {
        let queues: Vec<CommandQueue> = executor.run(&self.systems, &self.order, &self.dependants, &self.indegree, world);
        world.apply_commands(queues);
        world.update_events();
    }

    /// Convenience for the `Main` schedule: always sequential, per `spec.md` §4.1.
    pub fn run_main(&self, world: &mut World) {
        self.run_once(world, &SequentialExecutor);
    }
}

struct RegisteredSchedule {
    schedule: Schedule,
    stage: String,
    before: Vec<String>,
    after: Vec<String>,
}

/// Owns every named [`Schedule`], together with the stage it belongs to and its schedule-level
/// `before`/`after` edges against other schedules (`spec.md` §4.1 `RegisterSchedule<S>()`). A
/// separate `Vec` tracks registration order since `FxHashMap` iteration order isn't stable, and
/// registration order is what breaks ties in [`ScheduleRegistry::execute_stage`]'s topological
/// sort, matching the system-level graph's own tie-break rule.
pub struct ScheduleRegistry {
    schedules: FxHashMap<String, RegisteredSchedule>,
    registration_order: Vec<String>,
}

impl Default for ScheduleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self {
            schedules: FxHashMap::default(),
            registration_order: Vec::new(),
        }
    }

    /// Registers `schedule` under `name` with no stage membership and no schedule-level ordering.
    pub fn register(&mut self, name: impl Into<String>, schedule: Schedule) {
        self.register_in_stage(name, "", schedule, Vec::<&str>::new(), Vec::<&str>::new());
    }

    /// `RegisterSchedule<S>()`: idempotent — if `name` is already registered this is a no-op, its
    /// existing schedule/stage/ordering are kept. `before`/`after` name other schedules; an edge
    /// to a schedule that never gets registered, or isn't in the same stage at
    /// [`ScheduleRegistry::execute_stage`] time, is simply not drawn (`spec.md` §4.1's "missing
    /// schedule lookup is a no-op").
    pub fn register_in_stage(
        &mut self,
        name: impl Into<String>,
        stage: impl Into<String>,
        schedule: Schedule,
        before: impl IntoIterator<Item = impl Into<String>>,
        after: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let name = name.into();
        if self.schedules.contains_key(&name) {
            return;
        }
        self.registration_order.push(name.clone());
        self.schedules.insert(
            name,
            RegisteredSchedule {
                schedule,
                stage: stage.into(),
                before: before.into_iter().map(Into::into).collect(),
                after: after.into_iter().map(Into::into).collect(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Schedule> {
        self.schedules.get(name).map(|r| &r.schedule)
    }

    /// `ExecuteStage<S>` (`spec.md` §4.1/`SPEC_FULL.md` §11): runs every schedule registered under
    /// stage `stage`, in a deterministic order induced by their `before`/`after` edges, via Kahn's
    /// algorithm with a FIFO ready queue — the same determinism rule the system-level graph uses.
    pub fn execute_stage(&self, stage: &str, world: &mut World, executor: &dyn Executor) -> Result<(), ScheduleError> {
        let names: Vec<&String> = self
            .registration_order
            .iter()
            .filter(|name| self.schedules.get(name.as_str()).map(|r| r.stage == stage).unwrap_or(false))
            .collect();
        let n = names.len();
        let index_of: FxHashMap<&str, usize> = names.iter().enumerate().map(|(i, name)| (name.as_str(), i)).collect();

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let registered = &self.schedules[name.as_str()];
            for before in &registered.before {
                if let Some(&j) = index_of.get(before.as_str()) {
                    edges.push((i, j));
                }
            }
            for after in &registered.after {
                if let Some(&j) = index_of.get(after.as_str()) {
                    edges.push((j, i));
                }
            }
        }

        let mut dependants: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (a, b) in edges {
            dependants[a].push(b);
        }
        for adj in &mut dependants {
            adj.sort_unstable();
            adj.dedup();
        }
        let mut indegree = vec![0usize; n];
        for adj in &dependants {
            for &b in adj {
                indegree[b] += 1;
            }
        }

        let name_strs: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        detect_cycle(&name_strs, &dependants)?;

        let order = kahn_topological_order(n, &dependants, &mut indegree);
        for idx in order {
            let registered = &self.schedules[names[idx].as_str()];
            registered.schedule.run_once(world, executor);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemBuilder;

    struct Health(u32);
    struct Position(f32);

    #[test]
    fn independent_systems_both_appear_in_order() {
        let mut builder = ScheduleBuilder::new();
        builder.add_system(SystemBuilder::new("a").build(|_| {}));
        builder.add_system(SystemBuilder::new("b").build(|_| {}));
        let schedule = builder.build().unwrap();
        assert_eq!(schedule.order().len(), 2);
    }

    #[test]
    fn conflicting_systems_respect_registration_order() {
        let mut builder = ScheduleBuilder::new();
        builder.add_system(SystemBuilder::new("writer").write_resource::<Health>().build(|_| {}));
        builder.add_system(SystemBuilder::new("reader").read_resource::<Health>().build(|_| {}));
        let schedule = builder.build().unwrap();
        assert_eq!(schedule.order(), &[0, 1]);
    }

    #[test]
    fn explicit_ordering_independent_of_access() {
        let mut builder = ScheduleBuilder::new();
        let a = builder.add_system(SystemBuilder::new("a").read_component::<Position>().build(|_| {}));
        let b = builder.add_system(SystemBuilder::new("b").read_component::<Position>().build(|_| {}));
        builder.system_runs_before(b, a);
        let schedule = builder.build().unwrap();
        assert_eq!(schedule.order(), &[b, a]);
    }

    #[test]
    fn set_ordering_expands_to_per_system_edges() {
        let mut builder = ScheduleBuilder::new();
        let input = builder.add_system(SystemBuilder::new("input").build(|_| {}));
        let physics = builder.add_system(SystemBuilder::new("physics").build(|_| {}));
        builder.add_system_to_set(input, "input_set");
        builder.add_system_to_set(physics, "physics_set");
        builder.set_runs_before("input_set", "physics_set");
        let schedule = builder.build().unwrap();
        let input_pos = schedule.order().iter().position(|&i| i == input).unwrap();
        let physics_pos = schedule.order().iter().position(|&i| i == physics).unwrap();
        assert!(input_pos < physics_pos);
    }

    /// Registration order alone would have the conflict pass add a `reader -> writer` edge (reader
    /// registered first); an explicit `writer` -> `reader` edge already relates the pair the other
    /// way, so the conflict pass must leave it alone rather than adding a contradicting edge that
    /// would make `build()` fail with a spurious cycle.
    #[test]
    fn explicit_ordering_suppresses_conflicting_tie_break_edge() {
        let mut builder = ScheduleBuilder::new();
        let reader = builder.add_system(SystemBuilder::new("reader").read_resource::<Health>().build(|_| {}));
        let writer = builder.add_system(SystemBuilder::new("writer").write_resource::<Health>().build(|_| {}));
        builder.system_runs_before(writer, reader);
        let schedule = builder.build().unwrap();
        assert_eq!(schedule.order(), &[writer, reader]);
    }

    #[test]
    fn execute_stage_runs_schedules_in_before_after_order() {
        use crate::executor::SequentialExecutor;
        use ecs_core::world::World;

        let mut world = World::new();
        world.insert_resource(Vec::<&'static str>::new());

        let mut first = ScheduleBuilder::new();
        first.add_system(SystemBuilder::new("first").write_resource::<Vec<&'static str>>().build(|ctx| {
            ctx.write_resource::<Vec<&'static str>>().unwrap().push("first");
        }));
        let first = first.build().unwrap();

        let mut second = ScheduleBuilder::new();
        second.add_system(SystemBuilder::new("second").write_resource::<Vec<&'static str>>().build(|ctx| {
            ctx.write_resource::<Vec<&'static str>>().unwrap().push("second");
        }));
        let second = second.build().unwrap();

        let mut registry = ScheduleRegistry::new();
        // Registered in the "wrong" order; the explicit after-edge must still put `first` first.
        registry.register_in_stage("second", "update", second, Vec::<&str>::new(), ["first"]);
        registry.register_in_stage("first", "update", first, Vec::<&str>::new(), Vec::<&str>::new());

        registry.execute_stage("update", &mut world, &SequentialExecutor).unwrap();

        assert_eq!(
            world.read_resource::<Vec<&'static str>>().unwrap().as_slice(),
            &["first", "second"]
        );
    }
}
