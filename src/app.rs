//! Thin `App`/`SubApp` seam (`SPEC_FULL.md` §14): `spec.md` §1 places CLI/bootstrap and sub-app
//! composition out of scope for the core, but §6 still names the external contract points a
//! hosting application drives the core through (`AddModule`, `AddSubApp`, `Initialize`, `Run`).
//! This wires exactly that seam — one `World` plus one `Main` [`Schedule`] — and leaves everything
//! past the single `Module::configure` hook to the hosting application, per the Non-goal.

use fxhash::FxHashMap;
use tracing::info;

use ecs_core::world::World;
use ecs_systems::executor::{Executor, SequentialExecutor};
use ecs_systems::schedule::{Schedule, ScheduleBuilder, ScheduleError};
use ecs_systems::set::SetId;
use ecs_systems::system::SystemStorage;

/// Resource an application (or a system, via [`ecs_systems::context::SystemContext::write_resource`])
/// sets to stop [`App::run`]'s loop after the current cycle.
#[derive(Default)]
pub struct ExitFlag(pub bool);

/// A single `configure(&mut App)` hook, the one cross-cutting extension point `spec.md` §6 keeps
/// in scope for the core (everything past it — asset pipelines, plugin discovery, hot reload — is
/// explicitly left to the hosting application).
pub trait Module {
    fn configure(app: &mut App);
}

enum Systems {
    Building(ScheduleBuilder),
    Built(Schedule),
}

/// Wires one [`World`] to one `Main` schedule and drives them together.
pub struct App {
    world: World,
    main: Systems,
    executor: Box<dyn Executor>,
    sub_apps: FxHashMap<String, App>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        let mut world = World::new();
        world.insert_resource(ExitFlag::default());
        Self {
            world,
            main: Systems::Building(ScheduleBuilder::new()),
            executor: Box::new(SequentialExecutor),
            sub_apps: FxHashMap::default(),
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Overrides the executor used by [`App::run`]; the default is [`SequentialExecutor`],
    /// matching `spec.md` §4.1's requirement that `Main` always run synchronously.
    pub fn with_executor(mut self, executor: Box<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    fn builder_mut(&mut self) -> &mut ScheduleBuilder {
        match &mut self.main {
            Systems::Building(builder) => builder,
            Systems::Built(_) => panic!("App::add_system called after App::initialize"),
        }
    }

    pub fn add_system(&mut self, system: SystemStorage) -> &mut Self {
        self.builder_mut().add_system(system);
        self
    }

    pub fn add_systems(&mut self, systems: impl IntoIterator<Item = SystemStorage>) -> &mut Self {
        for system in systems {
            self.builder_mut().add_system(system);
        }
        self
    }

    /// Declares that every system in `before` must run before every system in `after`
    /// (`spec.md` §4.1 `AddSetRunsBefore`).
    pub fn configure_set(&mut self, before: impl Into<SetId>, after: impl Into<SetId>) -> &mut Self {
        self.builder_mut().set_runs_before(before, after);
        self
    }

    pub fn add_system_to_set(&mut self, system: usize, set: impl Into<SetId>) -> &mut Self {
        self.builder_mut().add_system_to_set(system, set);
        self
    }

    pub fn add_module<M: Module>(&mut self) -> &mut Self {
        M::configure(self);
        self
    }

    /// Stores `child` under `name` with no cross-app scheduling: the hosting application is
    /// responsible for calling into it, per the Non-goal on sub-app composition.
    pub fn add_sub_app(&mut self, name: impl Into<String>, child: App) -> &mut Self {
        self.sub_apps.insert(name.into(), child);
        self
    }

    pub fn sub_app(&self, name: &str) -> Option<&App> {
        self.sub_apps.get(name)
    }

    pub fn sub_app_mut(&mut self, name: &str) -> Option<&mut App> {
        self.sub_apps.get_mut(name)
    }

    /// Builds the `Main` schedule from every system registered so far. Idempotent once built:
    /// calling it again is a no-op.
    pub fn initialize(&mut self) -> Result<(), ScheduleError> {
        if let Systems::Building(_) = &self.main {
            let Systems::Building(builder) = std::mem::replace(&mut self.main, Systems::Building(ScheduleBuilder::new())) else {
                unreachable!()
            };
            let schedule = builder.build()?;
            info!(systems = schedule.system_count(), "initialized Main schedule");
            self.main = Systems::Built(schedule);
        }
        for sub_app in self.sub_apps.values_mut() {
            sub_app.initialize()?;
        }
        Ok(())
    }

    /// Drives `Main` once.
    pub fn run_once(&mut self) {
        // Field-level (not method-level) borrows of `self.main`/`self.world`/`self.executor` so
        // the compiler sees them as disjoint rather than all aliasing through a `&self` call.
        let Systems::Built(schedule) = &self.main else {
            panic!("App::run called before App::initialize");
        };
        schedule.run_once(&mut self.world, &*self.executor);
    }

    /// Drives `Main` in a loop until [`ExitFlag`] reads `true`, or exactly once if the resource
    /// has been removed from the world.
    pub fn run(&mut self) {
        loop {
            self.run_once();
            let should_exit = self.world.read_resource::<ExitFlag>().map(|flag| (*flag).0).unwrap_or(true);
            if should_exit {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecs_systems::system::SystemBuilder;

    #[test]
    fn run_once_executes_registered_systems() {
        let mut app = App::new();
        app.add_system(SystemBuilder::new("emit").build(|ctx| {
            ctx.emit_event(7u32);
        }));
        app.initialize().unwrap();
        app.run_once();

        let mut reader = ecs_core::event::EventReader::<u32>::new();
        assert_eq!(app.world().read_events(&mut reader), vec![&7u32]);
    }

    #[test]
    fn run_stops_when_exit_flag_set() {
        let mut app = App::new();
        app.add_system(SystemBuilder::new("request_exit").write_resource::<ExitFlag>().build(|ctx| {
            if let Ok(mut flag) = ctx.write_resource::<ExitFlag>() {
                (*flag).0 = true;
            }
        }));
        app.initialize().unwrap();
        app.run();
        assert!((*app.world().read_resource::<ExitFlag>().unwrap()).0);
    }

    struct Greeter;
    impl Module for Greeter {
        fn configure(app: &mut App) {
            app.add_system(SystemBuilder::new("greet").build(|_ctx| {
                tracing::debug!("hello from a module");
            }));
        }
    }

    #[test]
    fn module_configure_hook_runs() {
        let mut app = App::new();
        app.add_module::<Greeter>();
        app.initialize().unwrap();
        app.run_once();
    }
}
