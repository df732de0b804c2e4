use archetypal::{ComponentManager, EntityArchetype, EntityQuery, World};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default)]
pub struct MyComponent(i32);

#[derive(Debug, Clone, Default)]
pub struct Label(String);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let world = World::new();
    let registry = world.registry().clone();

    let archetype = EntityArchetype::new::<(MyComponent,)>(&registry)?;
    let entity = world.spawn(&archetype);

    world.with_manager::<ComponentManager, _>(|components| {
        if let Some(value) = components.component_mut::<MyComponent>(entity) {
            value.0 = 3;
        }
        components.add_component::<Label>(entity);
        if let Some(label) = components.component_mut::<Label>(entity) {
            label.0 = "hello".to_string();
        }

        println!("components: {:?}", components);
        println!("entity: {:?}", entity);

        if let Some(archetype) = components.entity_archetype(entity) {
            for info in archetype.component_infos() {
                println!("component: {:?}", info);
            }
        }

        let query = EntityQuery::new().with::<MyComponent>(&registry);
        let mut result = components.query(&query);
        result.for_each_with_entity::<(MyComponent,), _>(|entity, (value,)| {
            println!("{:?} has {:?}", entity, value);
        });
    });

    Ok(())
}
