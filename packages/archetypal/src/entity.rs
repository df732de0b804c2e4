//! Entity identities and their allocation.

use std::collections::HashSet;
use std::fmt::{self, Debug, Formatter};

use tracing::{trace, warn};

use crate::archetype::EntityArchetype;
use crate::component_manager::ComponentManager;

/// A handle to an entity.
///
/// An entity is nothing more than its components. The handle is an `id`, which
/// is unique among live entities, and a `generation`, which is bumped each
/// time the `id` is reused so that stale handles never alias a new entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Entity {
    id: usize,
    generation: usize,
}

impl Entity {
    /// The null entity. No live entity ever compares equal to it.
    pub const NULL: Entity = Entity { id: 0, generation: 0 };

    /// Construct an entity handle from its parts.
    pub const fn new(id: usize, generation: usize) -> Entity {
        Entity { id, generation }
    }

    /// Return the ID of this entity.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Return the generation of this entity.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Returns true if this is the null entity.
    pub fn is_null(&self) -> bool {
        *self == Entity::NULL
    }
}

impl Debug for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.id, self.generation)
    }
}

/// Issues entity handles and recycles removed ones.
///
/// Storage of components is delegated to a `ComponentManager`, which is
/// passed in to every operation that touches it.
#[derive(Debug, Default)]
pub struct EntityManager {
    last_id: usize,
    free: Vec<Entity>,
    live: HashSet<Entity>,
}

impl EntityManager {
    /// Create a new, empty, entity manager.
    pub fn new() -> EntityManager {
        EntityManager::default()
    }

    /// Returns true if the entity is live.
    pub fn has_entity(&self, entity: Entity) -> bool {
        self.live.contains(&entity)
    }

    /// Return the number of live entities.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns true if there are no live entities.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Iterate over every live entity, in no particular order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.live.iter().copied()
    }

    /// Create an entity with the given archetype.
    ///
    /// Each component is default-constructed. Returns `Entity::NULL` if the
    /// entity could not be stored, in which case the allocation is undone.
    pub fn add_entity(&mut self, components: &mut ComponentManager, archetype: &EntityArchetype) -> Entity {
        let archetype_id = match components.add_archetype(archetype) {
            Some(id) => id,
            None => return Entity::NULL,
        };
        let (entity, recycled) = self.allocate();

        if !components.add_entity(entity, archetype_id) {
            warn!(?entity, archetype = %archetype.identifier(), "failed to store new entity");
            self.release(&[(entity, recycled)]);
            return Entity::NULL;
        }

        self.live.insert(entity);
        entity
    }

    /// Create `count` entities with the given archetype.
    ///
    /// Either every entity is created or, on failure, none are and an empty
    /// list is returned.
    pub fn add_entities(&mut self, components: &mut ComponentManager, count: usize, archetype: &EntityArchetype) -> Vec<Entity> {
        let archetype_id = match components.add_archetype(archetype) {
            Some(id) => id,
            None => return Vec::new(),
        };
        let allocated: Vec<(Entity, bool)> = (0..count).map(|_| self.allocate()).collect();
        let entities: Vec<Entity> = allocated.iter().map(|(entity, _)| *entity).collect();

        if !components.add_entities(&entities, archetype_id) {
            warn!(count, archetype = %archetype.identifier(), "failed to store entity batch");
            self.release(&allocated);
            return Vec::new();
        }

        self.live.extend(entities.iter().copied());
        trace!(count, archetype = %archetype.identifier(), "created entities");
        entities
    }

    /// Create a new entity holding a copy of every component of `entity`.
    ///
    /// Returns `Entity::NULL` if `entity` is not live.
    pub fn clone_entity(&mut self, components: &mut ComponentManager, entity: Entity) -> Entity {
        if !self.has_entity(entity) {
            return Entity::NULL;
        }

        let (clone, recycled) = self.allocate();
        if !components.clone_entity(entity, clone) {
            warn!(?entity, "failed to clone entity");
            self.release(&[(clone, recycled)]);
            return Entity::NULL;
        }

        self.live.insert(clone);
        clone
    }

    /// Remove an entity and destroy its components.
    ///
    /// Removing an entity which is not live succeeds without doing anything.
    /// The entity's ID will be reused with the next generation.
    pub fn remove_entity(&mut self, components: &mut ComponentManager, entity: Entity) -> bool {
        if !self.live.remove(&entity) {
            return true;
        }

        components.remove_entity(entity);
        self.free.push(entity);
        true
    }

    /// Allocate a handle, returning it and whether its ID was recycled.
    fn allocate(&mut self) -> (Entity, bool) {
        match self.free.pop() {
            Some(previous) => (Entity::new(previous.id, previous.generation + 1), true),
            None => {
                self.last_id += 1;
                (Entity::new(self.last_id, 0), false)
            }
        }
    }

    /// Undo a sequence of allocations, leaving the allocator as it was.
    fn release(&mut self, allocated: &[(Entity, bool)]) {
        for (entity, recycled) in allocated.iter().rev() {
            if *recycled {
                self.free.push(Entity::new(entity.id, entity.generation - 1));
            } else {
                debug_assert_eq!(entity.id, self.last_id);
                self.last_id -= 1;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::*;
    use crate::component::TypeRegistry;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position(i32);

    fn setup() -> (ComponentManager, EntityArchetype) {
        let registry = Rc::new(TypeRegistry::new());
        let archetype = EntityArchetype::new::<(Position,)>(&registry).unwrap();
        (ComponentManager::new(registry), archetype)
    }

    #[test]
    fn test_ids_start_at_one() {
        let (mut components, archetype) = setup();
        let mut entities = EntityManager::new();

        let a = entities.add_entity(&mut components, &archetype);
        let b = entities.add_entity(&mut components, &archetype);
        assert_eq!(a, Entity::new(1, 0));
        assert_eq!(b, Entity::new(2, 0));
        assert!(!a.is_null());
        assert!(entities.has_entity(a));
        assert_eq!(entities.len(), 2);
    }

    #[test]
    fn test_generation_monotonicity() {
        let (mut components, archetype) = setup();
        let mut entities = EntityManager::new();

        let mut entity = entities.add_entity(&mut components, &archetype);
        for generation in 1..5 {
            assert!(entities.remove_entity(&mut components, entity));
            assert!(!entities.has_entity(entity));

            let next = entities.add_entity(&mut components, &archetype);
            assert_eq!(next.id(), entity.id());
            assert_eq!(next.generation(), entity.generation() + 1);
            assert_eq!(next.generation(), generation);
            entity = next;
        }
    }

    #[test]
    fn test_remove_idempotent() {
        let (mut components, archetype) = setup();
        let mut entities = EntityManager::new();

        let a = entities.add_entity(&mut components, &archetype);
        assert!(entities.remove_entity(&mut components, a));
        assert!(entities.remove_entity(&mut components, a));
        assert!(entities.remove_entity(&mut components, Entity::new(99, 3)));

        // A double removal must not put the ID on the free list twice.
        let b = entities.add_entity(&mut components, &archetype);
        let c = entities.add_entity(&mut components, &archetype);
        assert_eq!(b, Entity::new(1, 1));
        assert_eq!(c, Entity::new(2, 0));
    }

    #[test]
    fn test_failed_add_rolls_back() {
        let (mut components, archetype) = setup();
        let mut entities = EntityManager::new();
        let archetype_id = components.add_archetype(&archetype).unwrap();

        // Occupy the handle the manager will issue next.
        assert!(components.add_entity(Entity::new(1, 0), archetype_id));
        assert_eq!(entities.add_entity(&mut components, &archetype), Entity::NULL);
        assert!(entities.is_empty());

        assert!(components.remove_entity(Entity::new(1, 0)));
        assert_eq!(entities.add_entity(&mut components, &archetype), Entity::new(1, 0));
    }

    #[test]
    fn test_failed_batch_rolls_back_whole_batch() {
        let (mut components, archetype) = setup();
        let mut entities = EntityManager::new();

        let first = entities.add_entities(&mut components, 3, &archetype);
        for entity in &first {
            entities.remove_entity(&mut components, *entity);
        }

        // The batch reuses 3, 2 and 1 then takes 4 and 5. Block 5.
        let archetype_id = components.archetype_id(&archetype).unwrap();
        assert!(components.add_entity(Entity::new(5, 0), archetype_id));
        assert!(entities.add_entities(&mut components, 5, &archetype).is_empty());
        assert!(entities.is_empty());
        assert_eq!(components.entity_count(), 1);

        components.remove_entity(Entity::new(5, 0));
        let batch = entities.add_entities(&mut components, 5, &archetype);
        assert_eq!(batch, vec![
            Entity::new(3, 1),
            Entity::new(2, 1),
            Entity::new(1, 1),
            Entity::new(4, 0),
            Entity::new(5, 0),
        ]);
    }

    #[test]
    fn test_clone_entity() {
        let (mut components, archetype) = setup();
        let mut entities = EntityManager::new();

        let a = entities.add_entity(&mut components, &archetype);
        *components.component_mut::<Position>(a).unwrap() = Position(7);

        let b = entities.clone_entity(&mut components, a);
        assert_ne!(a, b);
        assert!(entities.has_entity(b));
        assert_eq!(components.component::<Position>(b), Some(&Position(7)));
        assert_eq!(entities.clone_entity(&mut components, Entity::new(42, 0)), Entity::NULL);
    }
}
