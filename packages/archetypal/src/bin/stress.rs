use archetypal::{ComponentManager, EntityArchetype, EntityManager, StoreConfig, World};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default)]
pub struct MyComponent(i32);

#[derive(Debug, Clone, Copy, Default)]
pub struct Marker;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let world = World::with_config(StoreConfig::new().with_initial_capacity(16));
    let archetype = EntityArchetype::new::<(MyComponent, Marker)>(world.registry())?;
    let mut to_strip = Vec::new();
    let mut to_delete = Vec::new();

    for round in 0..8 {
        world.with_manager::<ComponentManager, _>(|components| {
            for entity in to_strip.drain(..) {
                components.remove_component::<MyComponent>(entity);
            }
        });

        for entity in to_delete.drain(..) {
            world.despawn(entity);
        }

        let entities = world.spawn_batch(512, &archetype);
        for (idx, entity) in entities.into_iter().enumerate() {
            if idx % 12 == 11 {
                to_strip.push(entity);
            } else if idx % 17 == round {
                to_delete.push(entity);
            }
        }
    }

    let live = world.with_manager::<EntityManager, _>(|entities| entities.len());
    println!("live entities: {:?}", live);
    world.with_manager::<ComponentManager, _>(|components| {
        println!("components: {:?}", components);
    });

    Ok(())
}
