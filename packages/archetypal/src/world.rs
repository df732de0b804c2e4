//! A world which holds the managers entities and systems live in.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::archetype::EntityArchetype;
use crate::component::TypeRegistry;
use crate::component_manager::ComponentManager;
use crate::config::StoreConfig;
use crate::entity::{Entity, EntityManager};
use crate::system::{SystemManager, SystemParameters};

/// A world is a collection of managers, looked up by type.
///
/// `World::new()` installs a `ComponentManager`, an `EntityManager` and a
/// `SystemManager`, all sharing the world's `TypeRegistry`. Any other type
/// can be installed as a manager too.
///
/// Managers are held as `Rc<RefCell<T>>` so that systems, which only see
/// `&World`, can borrow the ones they need.
pub struct World {
    registry: Rc<TypeRegistry>,
    managers: HashMap<TypeId, Rc<dyn Any>>,
}

impl World {
    /// Create a world with the default managers and store settings.
    pub fn new() -> World {
        World::with_config(StoreConfig::default())
    }

    /// Create a world with the default managers, using `config` for component
    /// storage.
    pub fn with_config(config: StoreConfig) -> World {
        let mut world = World::empty();
        let components = ComponentManager::with_config(world.registry.clone(), config);
        world.add_manager(components);
        world.add_manager(EntityManager::new());
        world.add_manager(SystemManager::new());
        world
    }

    /// Create a world with no managers.
    pub fn empty() -> World {
        World {
            registry: Rc::new(TypeRegistry::new()),
            managers: HashMap::new(),
        }
    }

    /// Return the registry component types are identified with.
    pub fn registry(&self) -> &Rc<TypeRegistry> {
        &self.registry
    }

    /// Install a manager, replacing any existing manager of the same type.
    pub fn add_manager<T: 'static>(&mut self, manager: T) -> Rc<RefCell<T>> {
        let manager = Rc::new(RefCell::new(manager));
        self.set_manager(manager.clone());
        manager
    }

    /// Install a shared manager, replacing any existing manager of the same
    /// type.
    pub fn set_manager<T: 'static>(&mut self, manager: Rc<RefCell<T>>) {
        debug!(manager = type_name::<T>(), "installed manager");
        self.managers.insert(TypeId::of::<T>(), manager);
    }

    /// Get the manager of type `T`.
    pub fn get_manager<T: 'static>(&self) -> Option<Rc<RefCell<T>>> {
        self.managers.get(&TypeId::of::<T>())
            .and_then(|manager| manager.clone().downcast::<RefCell<T>>().ok())
    }

    /// Returns true if a manager of type `T` is installed.
    pub fn has_manager<T: 'static>(&self) -> bool {
        self.managers.contains_key(&TypeId::of::<T>())
    }

    /// Uninstall the manager of type `T`, returning it.
    pub fn remove_manager<T: 'static>(&mut self) -> Option<Rc<RefCell<T>>> {
        self.managers.remove(&TypeId::of::<T>())
            .and_then(|manager| manager.downcast::<RefCell<T>>().ok())
    }

    /// Run `f` with the manager of type `T` mutably borrowed.
    ///
    /// Returns None if there is no such manager or it is already borrowed.
    pub fn with_manager<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let manager = self.get_manager::<T>()?;
        let mut manager = manager.try_borrow_mut().ok()?;
        Some(f(&mut manager))
    }

    /// Create an entity with the given archetype.
    ///
    /// Returns `Entity::NULL` if the entity could not be created.
    pub fn spawn(&self, archetype: &EntityArchetype) -> Entity {
        self.with_entities(|entities, components| entities.add_entity(components, archetype))
            .unwrap_or(Entity::NULL)
    }

    /// Create `count` entities with the given archetype.
    ///
    /// Returns an empty list if the entities could not be created.
    pub fn spawn_batch(&self, count: usize, archetype: &EntityArchetype) -> Vec<Entity> {
        self.with_entities(|entities, components| entities.add_entities(components, count, archetype))
            .unwrap_or_default()
    }

    /// Remove an entity.
    ///
    /// Returns false only if the world has no entity or component manager.
    pub fn despawn(&self, entity: Entity) -> bool {
        self.with_entities(|entities, components| entities.remove_entity(components, entity))
            .unwrap_or(false)
    }

    /// Run every system in a pass.
    ///
    /// The `SystemManager` is not borrowed while the systems run.
    pub fn run_pass(&self, pass: &str, parameters: &mut SystemParameters<'_>) {
        match self.with_manager::<SystemManager, _>(|systems| systems.pass_systems(pass)) {
            Some(systems) => systems.run(self, parameters),
            None => warn!(pass, "no system manager to run pass"),
        }
    }

    fn with_entities<R>(&self, f: impl FnOnce(&mut EntityManager, &mut ComponentManager) -> R) -> Option<R> {
        let result = self.with_manager::<EntityManager, _>(|entities| {
            self.with_manager::<ComponentManager, _>(|components| f(entities, components))
        });

        match result {
            Some(Some(result)) => Some(result),
            _ => {
                warn!("world has no usable entity and component managers");
                None
            }
        }
    }
}

impl Default for World {
    fn default() -> Self {
        World::new()
    }
}

impl Debug for World {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("registry", &self.registry)
            .field("managers", &self.managers.len())
            .finish()
    }
}
