//! Manual timing harness (no `criterion` in this workspace's dependency stack) for the
//! conflict-derived scheduler: builds a `Main` schedule with a mix of independent and
//! resource-conflicting systems and times repeated `run_once` calls.

use std::time::Instant;

use ecs::ecs_core::world::World;
use ecs::ecs_systems::schedule::ScheduleBuilder;
use ecs::ecs_systems::system::SystemBuilder;

struct FrameCount(u64);
struct Score(u64);

fn build_schedule(system_count: usize) -> ecs::ecs_systems::schedule::Schedule {
    let mut builder = ScheduleBuilder::new();
    for i in 0..system_count {
        if i % 4 == 0 {
            builder.add_system(SystemBuilder::new(format!("writer_{i}")).write_resource::<Score>().build(|ctx| {
                if let Ok(mut score) = ctx.write_resource::<Score>() {
                    (*score).0 = (*score).0.wrapping_add(1);
                }
            }));
        } else {
            builder.add_system(SystemBuilder::new(format!("reader_{i}")).read_resource::<FrameCount>().build(|_ctx| {}));
        }
    }
    builder.build().expect("schedule has no cycles")
}

fn main() {
    let mut world = World::new();
    world.insert_resource(FrameCount(0));
    world.insert_resource(Score(0));

    let schedule = build_schedule(64);
    let iterations = 2_000;

    let start = Instant::now();
    for _ in 0..iterations {
        schedule.run_main(&mut world);
    }
    let elapsed = start.elapsed();

    println!(
        "scheduler: {} cycles x {} systems in {:?} ({:?}/cycle)",
        iterations,
        schedule.system_count(),
        elapsed,
        elapsed / iterations as u32
    );
}
