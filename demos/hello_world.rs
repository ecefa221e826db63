use ecs::ecs_core::world::World;
use ecs::ecs_systems::schedule::ScheduleBuilder;
use ecs::ecs_systems::system::SystemBuilder;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Position(f32, f32, f32);
#[derive(Clone, Copy, Debug, PartialEq)]
struct Velocity(f32, f32, f32);

fn main() {
    let mut world = World::new();
    for _ in 0..4 {
        let e = world.spawn();
        world.insert_component(e, Position(1.0, 2.0, 3.0));
        world.insert_component(e, Velocity(1.0, 2.0, 3.0));
    }

    let mut builder = ScheduleBuilder::new();
    builder.add_system(
        SystemBuilder::new("integrate_velocity")
            .write_component::<Position>()
            .read_component::<Velocity>()
            .build(|ctx| {
                let query = ctx.query::<(&mut Position, &Velocity), ()>();
                for (_entity, (pos, vel)) in query.iter(ctx.world()) {
                    pos.0 += vel.0;
                    pos.1 += vel.1;
                    pos.2 += vel.2;
                }
            }),
    );
    let schedule = builder.build().expect("schedule has no cycles");
    schedule.run_main(&mut world);
}
