//! Ownership of every archetype's storage and the routing of entities to it.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::ptr::NonNull;
use std::rc::Rc;

use bit_vec::BitVec;
use tracing::{debug, trace, warn};

use crate::archetype::EntityArchetype;
use crate::component::{Component, ComponentTypeID, TypeRegistry};
use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::query::{EntityQuery, QueryResult};
use crate::store::ComponentStore;

/// Identifies an archetype registered with a `ComponentManager`.
///
/// IDs of removed archetypes are reused.
pub type ArchetypeId = usize;

/// Owns the component storage of every entity.
///
/// Entities are grouped by archetype, with one `ComponentStore` per archetype.
/// For each component type the manager keeps the set of archetypes which
/// contain it, which is what queries are answered from.
pub struct ComponentManager {
    registry: Rc<TypeRegistry>,
    config: StoreConfig,
    stores: Vec<Option<ComponentStore>>,
    archetype_ids: HashMap<EntityArchetype, ArchetypeId>,
    free_ids: Vec<ArchetypeId>,
    entities: HashMap<Entity, ArchetypeId>,

    // Every bit vector is as long as `stores`.
    type_index: HashMap<ComponentTypeID, BitVec>,
}

impl ComponentManager {
    /// Create a new component manager with the default store settings.
    pub fn new(registry: Rc<TypeRegistry>) -> ComponentManager {
        ComponentManager::with_config(registry, StoreConfig::default())
    }

    /// Create a new component manager which applies `config` to every store.
    pub fn with_config(registry: Rc<TypeRegistry>, config: StoreConfig) -> ComponentManager {
        ComponentManager {
            registry,
            config,
            stores: Vec::new(),
            archetype_ids: HashMap::new(),
            free_ids: Vec::new(),
            entities: HashMap::new(),
            type_index: HashMap::new(),
        }
    }

    /// Return the registry component types are resolved with.
    pub fn registry(&self) -> &Rc<TypeRegistry> {
        &self.registry
    }

    /// Return the settings used for new stores.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Return the number of registered archetypes.
    pub fn archetype_count(&self) -> usize {
        self.archetype_ids.len()
    }

    /// Return the number of tracked entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if an equal archetype has been registered.
    pub fn has_archetype(&self, archetype: &EntityArchetype) -> bool {
        self.archetype_ids.contains_key(archetype)
    }

    /// Returns true if the archetype ID is in use.
    pub fn has_archetype_id(&self, archetype_id: ArchetypeId) -> bool {
        self.store(archetype_id).is_some()
    }

    /// Return the ID of a registered archetype.
    pub fn archetype_id(&self, archetype: &EntityArchetype) -> Option<ArchetypeId> {
        self.archetype_ids.get(archetype).copied()
    }

    /// Return the archetype registered under an ID.
    pub fn archetype(&self, archetype_id: ArchetypeId) -> Option<&EntityArchetype> {
        self.store(archetype_id).map(|store| store.archetype())
    }

    /// Return the store holding the entities of an archetype.
    pub fn store(&self, archetype_id: ArchetypeId) -> Option<&ComponentStore> {
        self.stores.get(archetype_id).and_then(|store| store.as_ref())
    }

    /// Iterate over every store along with its archetype ID.
    pub fn stores(&self) -> impl Iterator<Item = (ArchetypeId, &ComponentStore)> + '_ {
        self.stores.iter()
            .enumerate()
            .filter_map(|(id, store)| store.as_ref().map(|store| (id, store)))
    }

    /// Return the archetype ID of an entity.
    pub fn entity_archetype_id(&self, entity: Entity) -> Option<ArchetypeId> {
        self.entities.get(&entity).copied()
    }

    /// Return the archetype of an entity.
    pub fn entity_archetype(&self, entity: Entity) -> Option<&EntityArchetype> {
        self.entity_archetype_id(entity).and_then(|id| self.archetype(id))
    }

    /// Register an archetype, returning its ID.
    ///
    /// If an equal archetype was already registered its ID is returned.
    /// Returns `None` if a component of the archetype was not registered with
    /// this manager's registry as the same Rust type, or if its store cannot
    /// be created.
    pub fn add_archetype(&mut self, archetype: &EntityArchetype) -> Option<ArchetypeId> {
        // Archetypes compare by type ID alone, so a foreign archetype can be
        // equal to a registered one.
        for info in archetype.component_infos() {
            let registered = self.registry.info(info.type_id()).map(|known| known.rust_type());
            if registered != Some(info.rust_type()) {
                warn!(
                    component = info.name(),
                    archetype = %archetype.identifier(),
                    "component type does not belong to this registry"
                );
                return None;
            }
        }

        if let Some(id) = self.archetype_ids.get(archetype) {
            return Some(*id);
        }

        let store = match ComponentStore::try_new(archetype.clone(), &self.config) {
            Ok(store) => store,
            Err(err) => {
                warn!(archetype = %archetype.identifier(), %err, "cannot create component store");
                return None;
            }
        };
        let id = match self.free_ids.pop() {
            Some(id) => {
                self.stores[id] = Some(store);
                id
            }
            None => {
                self.stores.push(Some(store));
                for bits in self.type_index.values_mut() {
                    bits.push(false);
                }
                self.stores.len() - 1
            }
        };

        let len = self.stores.len();
        for component_type in archetype.component_types() {
            self.type_index.entry(*component_type)
                .or_insert_with(|| BitVec::from_elem(len, false))
                .set(id, true);
        }

        self.archetype_ids.insert(archetype.clone(), id);

        if let Some(store) = self.store(id) {
            debug!(
                id,
                archetype = %archetype.identifier(),
                stride = store.layout().stride(),
                align = store.layout().align(),
                "registered archetype"
            );
        }

        Some(id)
    }

    /// Remove an archetype which has no entities, freeing its ID.
    ///
    /// Returns false if entities still have the archetype. Removing an unknown
    /// archetype succeeds without doing anything.
    pub fn remove_archetype(&mut self, archetype_id: ArchetypeId) -> bool {
        let store = match self.store(archetype_id) {
            Some(store) => store,
            None => return true,
        };

        if !store.is_empty() {
            return false;
        }

        let archetype = store.archetype().clone();
        for component_type in archetype.component_types() {
            let now_unused = match self.type_index.get_mut(component_type) {
                Some(bits) => {
                    bits.set(archetype_id, false);
                    bits.none()
                }
                None => false,
            };

            if now_unused {
                self.type_index.remove(component_type);
            }
        }

        self.archetype_ids.remove(&archetype);
        self.stores[archetype_id] = None;
        self.free_ids.push(archetype_id);

        debug!(id = archetype_id, archetype = %archetype.identifier(), "removed archetype");
        true
    }

    /// Returns true if the entity is tracked.
    pub fn has_entity(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Store a new entity with the given archetype.
    ///
    /// Every component is default-constructed. Returns false, changing
    /// nothing, if the archetype is unknown or the entity is already tracked.
    pub fn add_entity(&mut self, entity: Entity, archetype_id: ArchetypeId) -> bool {
        if self.has_entity(entity) {
            warn!(?entity, "entity already has an archetype");
            return false;
        }

        let store = match self.store_mut(archetype_id) {
            Some(store) => store,
            None => return false,
        };

        store.insert(entity);
        self.entities.insert(entity, archetype_id);
        true
    }

    /// Store a batch of new entities with the given archetype.
    ///
    /// Either all entities are added or, if the archetype is unknown, any
    /// entity is already tracked or an entity is listed twice, none are.
    pub fn add_entities(&mut self, entities: &[Entity], archetype_id: ArchetypeId) -> bool {
        if !self.has_archetype_id(archetype_id) {
            return false;
        }

        let mut seen = HashSet::with_capacity(entities.len());
        for entity in entities {
            if self.has_entity(*entity) || !seen.insert(*entity) {
                warn!(?entity, "entity already has an archetype");
                return false;
            }
        }

        if let Some(store) = self.store_mut(archetype_id) {
            store.reserve(entities.len());
            for entity in entities {
                store.insert(*entity);
            }
        }

        self.entities.extend(entities.iter().map(|entity| (*entity, archetype_id)));
        true
    }

    /// Move an entity to a different archetype.
    ///
    /// Components in both archetypes keep their values, new components are
    /// default-constructed and components not in the new archetype are
    /// destroyed.
    ///
    /// Returns false if the entity is not tracked or the archetype is unknown.
    pub fn change_entity_archetype(&mut self, entity: Entity, archetype_id: ArchetypeId) -> bool {
        let current = match self.entity_archetype_id(entity) {
            Some(current) => current,
            None => {
                warn!(?entity, "cannot migrate untracked entity");
                return false;
            }
        };

        if current == archetype_id {
            return true;
        }

        let (source, dest) = match self.store_pair_mut(current, archetype_id) {
            Some(pair) => pair,
            None => return false,
        };

        if !dest.move_components_from(source, entity) {
            return false;
        }

        debug!(
            ?entity,
            from = %source.archetype().identifier(),
            to = %dest.archetype().identifier(),
            "migrated entity"
        );
        self.entities.insert(entity, archetype_id);
        true
    }

    /// Move several entities to a different archetype.
    ///
    /// Stops at, and returns false for, the first entity which cannot be moved.
    pub fn change_entity_archetypes(&mut self, entities: &[Entity], archetype_id: ArchetypeId) -> bool {
        entities.iter().all(|entity| self.change_entity_archetype(*entity, archetype_id))
    }

    /// Remove an entity, destroying its components.
    ///
    /// Returns false if the entity was not tracked.
    pub fn remove_entity(&mut self, entity: Entity) -> bool {
        let archetype_id = match self.entities.remove(&entity) {
            Some(id) => id,
            None => return false,
        };

        if let Some(store) = self.store_mut(archetype_id) {
            store.erase(entity);
        }
        true
    }

    /// Remove several entities.
    pub fn remove_entities(&mut self, entities: &[Entity]) {
        for entity in entities {
            self.remove_entity(*entity);
        }
    }

    /// Add a copy of every component of `source` to the untracked entity
    /// `dest`, which joins the same archetype.
    pub fn clone_entity(&mut self, source: Entity, dest: Entity) -> bool {
        if self.has_entity(dest) {
            return false;
        }

        let archetype_id = match self.entity_archetype_id(source) {
            Some(id) => id,
            None => return false,
        };

        let cloned = self.store_mut(archetype_id)
            .map_or(false, |store| store.clone_entity(source, dest));
        if cloned {
            self.entities.insert(dest, archetype_id);
        }
        cloned
    }

    /// Returns true if the entity has a component of the given type.
    pub fn has_component(&self, entity: Entity, component_type: ComponentTypeID) -> bool {
        self.entity_archetype(entity)
            .map_or(false, |archetype| archetype.has_component(component_type))
    }

    /// Get a pointer to a component of an entity.
    ///
    /// The pointer is invalidated by any structural change to the entity's
    /// store.
    pub fn component_ptr(&self, entity: Entity, component_type: ComponentTypeID) -> Option<NonNull<u8>> {
        let store = self.store(self.entity_archetype_id(entity)?)?;
        store.component_ptr(entity, component_type)
    }

    /// Get a reference to a component of an entity.
    pub fn component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let store = self.store(self.entity_archetype_id(entity)?)?;
        store.component::<T>(entity)
    }

    /// Get a mutable reference to a component of an entity.
    pub fn component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let archetype_id = self.entity_archetype_id(entity)?;
        self.store_mut(archetype_id)?.component_mut::<T>(entity)
    }

    /// Add a default-constructed `T` to an entity, migrating it.
    ///
    /// Succeeds without doing anything if the entity already has a `T`.
    pub fn add_component<T: Component>(&mut self, entity: Entity) -> bool {
        let archetype = match self.entity_archetype(entity) {
            Some(archetype) => archetype.with_component::<T>(&self.registry),
            None => return false,
        };

        match self.add_archetype(&archetype) {
            Some(archetype_id) => self.change_entity_archetype(entity, archetype_id),
            None => false,
        }
    }

    /// Remove the `T` component from an entity, migrating it.
    ///
    /// Succeeds without doing anything if the entity has no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> bool {
        let archetype = match self.entity_archetype(entity) {
            Some(archetype) => archetype.without_component::<T>(&self.registry),
            None => return false,
        };

        match self.add_archetype(&archetype) {
            Some(archetype_id) => self.change_entity_archetype(entity, archetype_id),
            None => false,
        }
    }

    /// Return the IDs of every archetype matching a query, in ascending order.
    ///
    /// An archetype matches if it has all of the query's required types and
    /// none of its excluded types. A query with no required types matches
    /// nothing.
    pub fn matching_archetypes(&self, query: &EntityQuery) -> Vec<ArchetypeId> {
        let mut required = query.required_types().iter();
        let mut bits = match required.next().and_then(|ty| self.type_index.get(ty)) {
            Some(bits) => bits.clone(),
            None => return Vec::new(),
        };

        for component_type in required {
            match self.type_index.get(component_type) {
                Some(other) => {
                    bits.and(other);
                }
                None => return Vec::new(),
            }
        }

        for component_type in query.excluded_types() {
            if let Some(other) = self.type_index.get(component_type) {
                bits.difference(other);
            }
        }

        bits.iter()
            .enumerate()
            .filter_map(|(id, matched)| if matched { Some(id) } else { None })
            .collect()
    }

    /// Run a query, collecting the matching entities and pointers to their
    /// required components.
    ///
    /// The result borrows the manager, so no structural change can happen
    /// while it is alive.
    pub fn query(&mut self, query: &EntityQuery) -> QueryResult<'_> {
        let column_types = query.required_types().to_vec();
        let columns = match column_types.iter().map(|ty| self.registry.info(*ty)).collect::<Option<Vec<_>>>() {
            Some(columns) => columns,
            None => return QueryResult::empty(column_types),
        };

        let matched = self.matching_archetypes(query);
        let mut entities = Vec::new();
        let mut components = Vec::new();
        let mut store_columns = Vec::with_capacity(column_types.len());

        for archetype_id in &matched {
            let store = match self.store(*archetype_id) {
                Some(store) => store,
                None => continue,
            };

            store_columns.clear();
            store_columns.extend(column_types.iter().filter_map(|ty| store.archetype().index_of(*ty)));
            debug_assert_eq!(store_columns.len(), column_types.len());

            entities.reserve(store.len());
            components.reserve(store.len() * store_columns.len());
            for (index, entity) in store.entities().iter().enumerate() {
                entities.push(*entity);
                store.row_ptrs(index, &store_columns, &mut components);
            }
        }

        trace!(
            required = query.required_types().len(),
            excluded = query.excluded_types().len(),
            archetypes = matched.len(),
            rows = entities.len(),
            "evaluated query"
        );

        QueryResult::new(entities, components, column_types, columns)
    }

    fn store_mut(&mut self, archetype_id: ArchetypeId) -> Option<&mut ComponentStore> {
        self.stores.get_mut(archetype_id).and_then(|store| store.as_mut())
    }

    /// Borrow two distinct stores mutably.
    fn store_pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> Option<(&mut ComponentStore, &mut ComponentStore)> {
        if a == b || a >= self.stores.len() || b >= self.stores.len() {
            return None;
        }

        let (a, b, swapped) = if a < b { (a, b, false) } else { (b, a, true) };
        let (low, high) = self.stores.split_at_mut(b);
        let first = low[a].as_mut()?;
        let second = high[0].as_mut()?;

        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }
}

impl Debug for ComponentManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentManager")
            .field("config", &self.config)
            .field("stores", &self.stores().map(|(_, store)| store).collect::<Vec<_>>())
            .field("entities", &self.entities.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;
    use crate::entity::EntityManager;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct A(u32);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct B(u64);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct C(i16);

    impl Default for C {
        fn default() -> C {
            C(-1)
        }
    }

    #[derive(Clone, Default)]
    struct Tracked(Option<Rc<Cell<usize>>>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            if let Some(count) = &self.0 {
                count.set(count.get() + 1);
            }
        }
    }

    fn manager() -> ComponentManager {
        ComponentManager::new(Rc::new(TypeRegistry::new()))
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Wide(u64);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Narrow(u8);

    #[test]
    fn test_foreign_archetype_rejected() {
        let mut components = manager();
        let registry = components.registry().clone();
        let foreign = TypeRegistry::new();

        // Both registries issue their first ID to a different type.
        let narrow = registry.type_of::<Narrow>();
        let wide = EntityArchetype::new::<(Wide,)>(&foreign).unwrap();
        assert_eq!(wide.component_types(), &[narrow]);

        assert_eq!(components.add_archetype(&wide), None);
        assert_eq!(components.archetype_count(), 0);

        let mut entities = EntityManager::new();
        assert!(entities.add_entity(&mut components, &wide).is_null());
        assert!(entities.add_entities(&mut components, 3, &wide).is_empty());
        assert!(entities.is_empty());

        let query = EntityQuery::new().with_type(narrow);
        assert!(components.query(&query).is_empty());

        // The same Rust type under the same ID is accepted from any registry.
        let twin = TypeRegistry::new();
        let narrow_archetype = EntityArchetype::new::<(Narrow,)>(&twin).unwrap();
        let id = components.add_archetype(&narrow_archetype).unwrap();
        let entity = entities.add_entity(&mut components, &narrow_archetype);
        *components.component_mut::<Narrow>(entity).unwrap() = Narrow(7);

        // An equal archetype over a different type must not reach that store.
        assert_eq!(components.add_archetype(&wide), None);
        assert!(entities.add_entity(&mut components, &wide).is_null());
        assert_eq!(components.store(id).unwrap().len(), 1);

        let mut seen = Vec::new();
        components.query(&query).for_each::<(Narrow,), _>(|(value,)| seen.push(*value));
        assert_eq!(seen, vec![Narrow(7)]);
        assert!(components.query(&query).get::<(Wide,)>(0).is_none());
    }

    #[test]
    fn test_unallocatable_store_rejected() {
        let registry = Rc::new(TypeRegistry::new());
        let config = StoreConfig::new().with_initial_capacity(usize::MAX / 2);
        let mut components = ComponentManager::with_config(registry.clone(), config);

        // Slots of the empty archetype have no size, so any capacity fits.
        let empty = components.add_archetype(&EntityArchetype::empty()).unwrap();
        let entity = Entity::new(1, 0);
        assert!(components.add_entity(entity, empty));

        assert!(!components.add_component::<A>(entity));
        assert_eq!(components.entity_archetype_id(entity), Some(empty));
        assert_eq!(components.archetype_count(), 1);
        assert!(!components.has_archetype(&EntityArchetype::new::<(A,)>(&registry).unwrap()));
    }

    #[test]
    fn test_archetype_dedup() {
        let mut components = manager();
        let ab = EntityArchetype::new::<(A, B)>(components.registry()).unwrap();
        let ba = EntityArchetype::new::<(B, A)>(components.registry()).unwrap();

        let id = components.add_archetype(&ab).unwrap();
        assert_eq!(components.add_archetype(&ba).unwrap(), id);
        assert_eq!(components.archetype_count(), 1);
        assert!(components.has_archetype(&ba));
        assert_eq!(components.archetype_id(&ba), Some(id));
        assert_eq!(components.archetype(id), Some(&ab));
    }

    #[test]
    fn test_add_entity_conflicts() {
        let mut components = manager();
        let a = EntityArchetype::new::<(A,)>(components.registry()).unwrap();
        let id = components.add_archetype(&a).unwrap();
        let entity = Entity::new(1, 0);

        assert!(!components.add_entity(entity, id + 1));
        assert!(components.add_entity(entity, id));
        assert!(!components.add_entity(entity, id));
        assert_eq!(components.entity_archetype_id(entity), Some(id));
        assert_eq!(components.store(id).unwrap().len(), 1);

        assert!(components.remove_entity(entity));
        assert!(!components.remove_entity(entity));
        assert!(!components.has_entity(entity));
    }

    #[test]
    fn test_add_entities_all_or_nothing() {
        let mut components = manager();
        let a = EntityArchetype::new::<(A,)>(components.registry()).unwrap();
        let id = components.add_archetype(&a).unwrap();

        let batch: Vec<Entity> = (1..=4).map(|i| Entity::new(i, 0)).collect();
        assert!(components.add_entity(batch[2], id));
        assert!(!components.add_entities(&batch, id));
        assert_eq!(components.entity_count(), 1);

        let duplicated = [Entity::new(7, 0), Entity::new(7, 0)];
        assert!(!components.add_entities(&duplicated, id));

        components.remove_entity(batch[2]);
        assert!(components.add_entities(&batch, id));
        assert_eq!(components.store(id).unwrap().entities(), &batch[..]);
    }

    #[test]
    fn test_query_with_without() {
        let mut components = manager();
        let registry = components.registry().clone();
        let ab = components.add_archetype(&EntityArchetype::new::<(A, B)>(&registry).unwrap()).unwrap();
        let ac = components.add_archetype(&EntityArchetype::new::<(A, C)>(&registry).unwrap()).unwrap();
        let abc = components.add_archetype(&EntityArchetype::new::<(A, B, C)>(&registry).unwrap()).unwrap();

        for (i, id) in [ab, ac, abc, ab, ac, abc, ab].iter().enumerate() {
            assert!(components.add_entity(Entity::new(i + 1, 0), *id));
        }

        let query = EntityQuery::new()
            .with::<A>(&registry)
            .with::<B>(&registry)
            .without::<C>(&registry);

        assert_eq!(components.matching_archetypes(&query), vec![ab]);
        let result = components.query(&query);
        assert_eq!(result.entities(), &[Entity::new(1, 0), Entity::new(4, 0), Entity::new(7, 0)]);
        assert_eq!(result.column_count(), 2);
        assert_eq!(result.components().len(), 6);
    }

    #[test]
    fn test_query_unknown_type() {
        let mut components = manager();
        let registry = components.registry().clone();
        let a = components.add_archetype(&EntityArchetype::new::<(A,)>(&registry).unwrap()).unwrap();
        components.add_entity(Entity::new(1, 0), a);

        let query = EntityQuery::new().with::<A>(&registry).with::<B>(&registry);
        assert!(components.query(&query).is_empty());
        assert!(components.query(&EntityQuery::new()).is_empty());

        // Excluding a type nothing has excludes nothing.
        let query = EntityQuery::new().with::<A>(&registry).without::<C>(&registry);
        assert_eq!(components.query(&query).len(), 1);
    }

    #[test]
    fn test_migration_preserves_shared() {
        let mut components = manager();
        let registry = components.registry().clone();
        let drops = Rc::new(Cell::new(0));

        let from = components.add_archetype(&EntityArchetype::new::<(A, Tracked)>(&registry).unwrap()).unwrap();
        let to = components.add_archetype(&EntityArchetype::new::<(A, C)>(&registry).unwrap()).unwrap();
        let entity = Entity::new(1, 0);
        let other = Entity::new(2, 0);

        components.add_entity(entity, from);
        components.add_entity(other, from);
        *components.component_mut::<A>(entity).unwrap() = A(42);
        components.component_mut::<Tracked>(entity).unwrap().0 = Some(drops.clone());

        assert!(components.change_entity_archetype(entity, to));
        assert_eq!(components.entity_archetype_id(entity), Some(to));
        assert_eq!(components.component::<A>(entity), Some(&A(42)));
        assert_eq!(components.component::<C>(entity), Some(&C(-1)));
        assert!(components.component::<Tracked>(entity).is_none());
        assert_eq!(drops.get(), 1);

        assert_eq!(components.store(from).unwrap().entities(), &[other]);
        assert!(components.change_entity_archetype(entity, to));
        assert!(!components.change_entity_archetype(entity, 99));
        assert!(!components.change_entity_archetype(Entity::new(9, 0), from));
    }

    #[test]
    fn test_add_remove_component() {
        let mut components = manager();
        let registry = components.registry().clone();
        let a = components.add_archetype(&EntityArchetype::new::<(A,)>(&registry).unwrap()).unwrap();
        let entity = Entity::new(1, 0);
        components.add_entity(entity, a);
        *components.component_mut::<A>(entity).unwrap() = A(3);

        assert!(components.add_component::<B>(entity));
        assert!(components.has_component(entity, registry.type_of::<B>()));
        assert_eq!(components.component::<A>(entity), Some(&A(3)));
        assert_eq!(components.component::<B>(entity), Some(&B(0)));

        assert!(components.remove_component::<A>(entity));
        assert!(!components.has_component(entity, registry.type_of::<A>()));
        assert_eq!(components.component::<B>(entity), Some(&B(0)));
        assert_eq!(components.archetype_count(), 3);

        assert!(!components.add_component::<B>(Entity::new(5, 0)));
    }

    #[test]
    fn test_remove_archetype_reuses_id() {
        let mut components = manager();
        let registry = components.registry().clone();
        let a = EntityArchetype::new::<(A,)>(&registry).unwrap();
        let ab = EntityArchetype::new::<(A, B)>(&registry).unwrap();
        let c = EntityArchetype::new::<(C,)>(&registry).unwrap();

        let a_id = components.add_archetype(&a).unwrap();
        let ab_id = components.add_archetype(&ab).unwrap();
        components.add_entity(Entity::new(1, 0), a_id);

        assert!(!components.remove_archetype(a_id));
        assert!(components.remove_archetype(ab_id));
        assert!(components.remove_archetype(ab_id));
        assert!(!components.has_archetype(&ab));

        let query = EntityQuery::new().with::<B>(&registry);
        assert!(components.matching_archetypes(&query).is_empty());

        let c_id = components.add_archetype(&c).unwrap();
        assert_eq!(c_id, ab_id);
        assert_eq!(components.archetype(c_id), Some(&c));
        assert!(components.matching_archetypes(&query).is_empty());

        let query = EntityQuery::new().with::<C>(&registry);
        assert_eq!(components.matching_archetypes(&query), vec![c_id]);
    }

    #[test]
    fn test_clone_entity() {
        let mut components = manager();
        let registry = components.registry().clone();
        let ab = components.add_archetype(&EntityArchetype::new::<(A, B)>(&registry).unwrap()).unwrap();
        let source = Entity::new(1, 0);
        let dest = Entity::new(2, 0);

        components.add_entity(source, ab);
        *components.component_mut::<B>(source).unwrap() = B(11);

        assert!(components.clone_entity(source, dest));
        assert!(!components.clone_entity(source, dest));
        assert!(!components.clone_entity(Entity::new(3, 0), Entity::new(4, 0)));
        assert_eq!(components.entity_archetype_id(dest), Some(ab));
        assert_eq!(components.component::<B>(dest), Some(&B(11)));
    }
}
