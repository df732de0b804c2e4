use std::any::Any;
use std::collections::HashMap;
use std::io::Write;

use archetypal::{ComponentManager, Entity, EntityArchetype, EntityQuery, System, SystemManager, SystemParameters, World};
use tracing_subscriber::EnvFilter;

const G: f32 = 10.0;
const TIME_STEP: f32 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct Position(f32, f32);

#[derive(Debug, Clone, Copy, Default)]
pub struct Velocity(f32, f32);

#[derive(Debug, Clone, Copy, Default)]
pub struct Mass(f32);

#[derive(Default)]
struct ApplyAcceleration {
    query: EntityQuery,
}

impl System for ApplyAcceleration {
    fn initialize(&mut self, world: &World) {
        let registry = world.registry();
        self.query = EntityQuery::new()
            .with::<Position>(registry)
            .with::<Velocity>(registry)
            .with::<Mass>(registry);
    }

    fn run(&mut self, world: &World, _parameter: Option<&mut dyn Any>) {
        let query = &self.query;
        world.with_manager::<ComponentManager, _>(|components| {
            let mut result = components.query(query);

            let mut bodies = Vec::with_capacity(result.len());
            result.for_each_with_entity::<(Position, Mass), _>(|entity, (position, mass)| {
                bodies.push((entity, *position, *mass));
            });

            result.for_each_with_entity::<(Position, Velocity, Mass), _>(|id_a, (position, velocity, mass)| {
                let Position(x_a, y_a) = *position;
                let Velocity(vx_a, vy_a) = velocity;
                let Mass(m_a) = mass;

                if *m_a <= 0.0 {
                    return;
                }

                *vx_a = 0f32;
                *vy_a = 0f32;

                for (id_b, Position(x_b, y_b), Mass(m_b)) in bodies.iter() {
                    if *id_b == id_a || *m_b < 0.00001 {
                        continue;
                    }

                    let dx = x_b - x_a;
                    let dy = y_b - y_a;
                    let r2 = dx * dx + dy * dy;

                    // Bodies are overlapped!
                    if r2 < 0.0005 {
                        *m_a = 0.0;
                        continue;
                    }

                    let a = (G * m_b) / r2;
                    let r = r2.sqrt();
                    *vx_a += TIME_STEP * ((dx * a) / r);
                    *vy_a += TIME_STEP * ((dy * a) / r);
                }
            });
        });
    }
}

#[derive(Default)]
struct ApplyVelocity {
    query: EntityQuery,
}

impl System for ApplyVelocity {
    fn initialize(&mut self, world: &World) {
        self.query = EntityQuery::new()
            .with::<Position>(world.registry())
            .with::<Velocity>(world.registry());
    }

    fn run(&mut self, world: &World, _parameter: Option<&mut dyn Any>) {
        let query = &self.query;
        world.with_manager::<ComponentManager, _>(|components| {
            components.query(query).for_each::<(Position, Velocity), _>(|(position, velocity)| {
                position.0 += TIME_STEP * velocity.0;
                position.1 += TIME_STEP * velocity.1;
            });
        });
    }
}

/// Appends a line segment to the trail of every body which moved.
struct RenderTrails {
    query: EntityQuery,
    last_positions: HashMap<Entity, (f32, f32)>,
}

const SIZE: (i32, i32) = (500, 500);
const OFFSET: (f32, f32) = (250.0, 250.0);
const SCALE: (f32, f32) = (200.0, 200.0);

impl System for RenderTrails {
    fn run(&mut self, world: &World, parameter: Option<&mut dyn Any>) {
        let out = match parameter.and_then(|p| p.downcast_mut::<String>()) {
            Some(out) => out,
            None => return,
        };

        let query = &self.query;
        let last_positions = &mut self.last_positions;
        world.with_manager::<ComponentManager, _>(|components| {
            let mut result = components.query(query);
            result.for_each_with_entity::<(Position, Velocity), _>(|entity, (position, velocity)| {
                let Position(x, y) = *position;
                let Velocity(vx, vy) = *velocity;
                let v2 = (vx * vx + vy * vy).sqrt();
                let a = 1.0 - (v2 / 0.03).max(0.0).min(0.7);

                if let Some((lx, ly)) = last_positions.get(&entity) {
                    let x1 = lx * SCALE.0 + OFFSET.0;
                    let y1 = ly * SCALE.1 + OFFSET.1;
                    let x2 = x * SCALE.0 + OFFSET.0;
                    let y2 = y * SCALE.1 + OFFSET.1;

                    out.push_str(&format!(
                        "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" style=\"stroke:rgba(255,0,0,{});stroke-width:1\" />",
                        x1, y1, x2, y2, a));
                }

                last_positions.insert(entity, (x, y));
            });
        });
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let world = World::new();
    let registry = world.registry().clone();
    let body = EntityArchetype::new::<(Position, Velocity, Mass)>(&registry)?;

    // Populate world!
    {
        const SQRT_NUM_ENTITIES: usize = 2;
        const SCALE: f32 = 2.0 / ((SQRT_NUM_ENTITIES - 1) as f32);

        let entities = world.spawn_batch(SQRT_NUM_ENTITIES * SQRT_NUM_ENTITIES, &body);
        world.with_manager::<ComponentManager, _>(|components| {
            for (idx, entity) in entities.iter().enumerate() {
                let x = ((idx / SQRT_NUM_ENTITIES) as f32 * SCALE) - 1.0;
                let y = ((idx % SQRT_NUM_ENTITIES) as f32 * SCALE) - 1.0;

                if let Some(mass) = components.component_mut::<Mass>(*entity) {
                    *mass = Mass(0.00001);
                }
                if let Some(position) = components.component_mut::<Position>(*entity) {
                    *position = Position(x, y);
                }
                if let Some(velocity) = components.component_mut::<Velocity>(*entity) {
                    *velocity = Velocity(y * 0.003, -x * 0.003);
                }
            }
        });
    }

    let trails = RenderTrails {
        query: EntityQuery::from_archetype(&body),
        last_positions: HashMap::new(),
    };
    world.with_manager::<SystemManager, _>(|systems| {
        systems.add_system::<ApplyAcceleration>(&world, "update");
        systems.add_system::<ApplyVelocity>(&world, "update");
        systems.set_system(&world, "render", trails);
    });

    const NUM_ITER: usize = 100;

    let mut dest = std::io::stdout();
    let mut svg = String::new();

    write!(&mut dest, "<?xml version=\"1.0\" standalone=\"no\"?>\n")?;
    write!(&mut dest, "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.0//EN\" \"http://www.w3.org/TR/2001/REC-SVG-20010904/DTD/svg10.dtd\">\n")?;
    write!(&mut dest, "<svg xmlns=\"http://www.w3.org/2000/svg\" height=\"{}\" width=\"{}\">", SIZE.0, SIZE.1)?;
    write!(&mut dest, "<rect width=\"100%\" height=\"100%\" fill=\"black\"/>")?;

    for _ in 0..NUM_ITER {
        for _ in 0..10usize {
            world.run_pass("update", &mut SystemParameters::new());
        }

        // Render result!
        world.run_pass("render", &mut SystemParameters::new().with::<RenderTrails>(&mut svg));
        dest.write_all(svg.as_bytes())?;
        svg.clear();
    }

    write!(&mut dest, "</svg>")?;
    Ok(())
}
