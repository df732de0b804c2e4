//! Structural queries over the entities of a `ComponentManager`.
//!
//! An `EntityQuery` names the component types an entity must have and those
//! it must not have. Running it produces a `QueryResult`: the matching
//! entities and a pointer to each of their required components, laid out as a
//! flat table with one row per entity and one column per required type.

use std::any::TypeId;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::archetype::EntityArchetype;
use crate::component::{Component, ComponentInfo, ComponentTypeID, TypeRegistry};
use crate::component_manager::ComponentManager;
use crate::entity::Entity;

/// A filter over entities by component type.
///
/// The required and excluded lists are kept sorted and disjoint: requiring a
/// type removes it from the excluded list and vice versa, so the last call
/// for a given type wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityQuery {
    with: Vec<ComponentTypeID>,
    without: Vec<ComponentTypeID>,
}

impl EntityQuery {
    /// Create a query which matches nothing.
    pub fn new() -> EntityQuery {
        EntityQuery::default()
    }

    /// Create a query requiring every component of an archetype.
    pub fn from_archetype(archetype: &EntityArchetype) -> EntityQuery {
        EntityQuery {
            with: archetype.component_types().to_vec(),
            without: Vec::new(),
        }
    }

    /// Require a component type.
    pub fn with_type(mut self, component_type: ComponentTypeID) -> Self {
        remove_sorted(&mut self.without, component_type);
        insert_sorted(&mut self.with, component_type);
        self
    }

    /// Exclude a component type.
    pub fn without_type(mut self, component_type: ComponentTypeID) -> Self {
        remove_sorted(&mut self.with, component_type);
        insert_sorted(&mut self.without, component_type);
        self
    }

    /// Require several component types.
    pub fn with_types(self, component_types: &[ComponentTypeID]) -> Self {
        component_types.iter().fold(self, |query, ty| query.with_type(*ty))
    }

    /// Exclude several component types.
    pub fn without_types(self, component_types: &[ComponentTypeID]) -> Self {
        component_types.iter().fold(self, |query, ty| query.without_type(*ty))
    }

    /// Require the component type `T`.
    pub fn with<T: Component>(self, registry: &TypeRegistry) -> Self {
        self.with_type(registry.type_of::<T>())
    }

    /// Exclude the component type `T`.
    pub fn without<T: Component>(self, registry: &TypeRegistry) -> Self {
        self.without_type(registry.type_of::<T>())
    }

    /// The required component types, in ascending order.
    pub fn required_types(&self) -> &[ComponentTypeID] {
        &self.with
    }

    /// The excluded component types, in ascending order.
    pub fn excluded_types(&self) -> &[ComponentTypeID] {
        &self.without
    }

    /// Returns true if an archetype satisfies this query.
    pub fn matches(&self, archetype: &EntityArchetype) -> bool {
        !self.with.is_empty()
            && archetype.has_all_components(&self.with)
            && !self.without.iter().any(|ty| archetype.has_component(*ty))
    }

    /// Run the query against a component manager.
    pub fn query<'a>(&self, components: &'a mut ComponentManager) -> QueryResult<'a> {
        components.query(self)
    }
}

fn insert_sorted(list: &mut Vec<ComponentTypeID>, component_type: ComponentTypeID) {
    if let Err(idx) = list.binary_search(&component_type) {
        list.insert(idx, component_type);
    }
}

fn remove_sorted(list: &mut Vec<ComponentTypeID>, component_type: ComponentTypeID) {
    if let Ok(idx) = list.binary_search(&component_type) {
        list.remove(idx);
    }
}

/// The entities matching a query and pointers to their components.
///
/// Row `i` belongs to `entities()[i]`; its pointers are at
/// `components()[i * column_count() .. (i + 1) * column_count()]`, one per
/// required type in ascending type order.
///
/// The result mutably borrows the `ComponentManager` it came from, so the
/// pointers cannot be invalidated while it is alive.
pub struct QueryResult<'a> {
    entities: Vec<Entity>,
    components: Vec<NonNull<u8>>,
    column_types: Vec<ComponentTypeID>,
    columns: Vec<ComponentInfo>,
    _manager: PhantomData<&'a mut ComponentManager>,
}

impl<'a> QueryResult<'a> {
    pub(crate) fn new(
        entities: Vec<Entity>,
        components: Vec<NonNull<u8>>,
        column_types: Vec<ComponentTypeID>,
        columns: Vec<ComponentInfo>,
    ) -> QueryResult<'a> {
        debug_assert_eq!(column_types.len(), columns.len());
        debug_assert_eq!(components.len(), entities.len() * columns.len());

        QueryResult {
            entities,
            components,
            column_types,
            columns,
            _manager: PhantomData,
        }
    }

    pub(crate) fn empty(column_types: Vec<ComponentTypeID>) -> QueryResult<'a> {
        QueryResult {
            entities: Vec::new(),
            components: Vec::new(),
            column_types,
            columns: Vec::new(),
            _manager: PhantomData,
        }
    }

    /// Return the number of matching entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entities matched.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Return the number of component columns.
    pub fn column_count(&self) -> usize {
        self.column_types.len()
    }

    /// Return the matching entities, in row order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Return the flat component pointer table.
    pub fn components(&self) -> &[NonNull<u8>] {
        &self.components
    }

    /// Return the component type of each column.
    pub fn column_types(&self) -> &[ComponentTypeID] {
        &self.column_types
    }

    /// Return the column holding a component type.
    pub fn type_index(&self, component_type: ComponentTypeID) -> Option<usize> {
        self.column_types.binary_search(&component_type).ok()
    }

    /// Returns true if the result has a column for the component type.
    pub fn contains(&self, component_type: ComponentTypeID) -> bool {
        self.type_index(component_type).is_some()
    }

    /// Returns true if the result has a column for every given type.
    pub fn contains_all(&self, component_types: &[ComponentTypeID]) -> bool {
        component_types.iter().all(|ty| self.contains(*ty))
    }

    /// Return the entity and component pointers of a row.
    pub fn at(&self, index: usize) -> Option<(Entity, &[NonNull<u8>])> {
        let entity = *self.entities.get(index)?;
        Some((entity, self.row(index)))
    }

    /// Fetch typed components of one row.
    ///
    /// Returns None if the row does not exist, a requested type has no column
    /// or a type is requested twice.
    pub fn get<'s, Q: Fetch<'s>>(&'s mut self, index: usize) -> Option<Q::Item> {
        if index >= self.entities.len() {
            return None;
        }

        let columns = self.resolve(Q::rust_types())?;
        Some(unsafe { Q::fetch(self.row(index), &columns) })
    }

    /// Call `f` with typed components of every row, in row order.
    ///
    /// Nothing is called if a requested type has no column or a type is
    /// requested twice.
    pub fn for_each<'s, Q, F>(&'s mut self, mut f: F)
        where Q: Fetch<'s>,
              F: FnMut(Q::Item)
    {
        self.for_each_with_entity::<Q, _>(|_, item| f(item))
    }

    /// Call `f` with the entity and typed components of every row, in row
    /// order.
    pub fn for_each_with_entity<'s, Q, F>(&'s mut self, mut f: F)
        where Q: Fetch<'s>,
              F: FnMut(Entity, Q::Item)
    {
        let columns = match self.resolve(Q::rust_types()) {
            Some(columns) => columns,
            None => return,
        };

        for (index, entity) in self.entities.iter().enumerate() {
            let item = unsafe { Q::fetch(self.row(index), &columns) };
            f(*entity, item);
        }
    }

    /// Keep only the rows whose `T` component satisfies `predicate`.
    ///
    /// Row order is preserved. If the result has no column for `T`, no row
    /// can satisfy it and the result is emptied.
    pub fn filter<T, P>(&mut self, mut predicate: P)
        where T: Component,
              P: FnMut(&T) -> bool
    {
        let column = match self.columns.iter().position(|info| info.is::<T>()) {
            Some(column) => column,
            None => {
                self.entities.clear();
                self.components.clear();
                return;
            }
        };

        let width = self.column_count();
        let mut kept = 0;
        for index in 0..self.entities.len() {
            let value = unsafe { &*(self.components[index * width + column].as_ptr() as *const T) };
            if !predicate(value) {
                continue;
            }

            if kept != index {
                self.entities[kept] = self.entities[index];
                self.components.copy_within(index * width..(index + 1) * width, kept * width);
            }
            kept += 1;
        }

        self.entities.truncate(kept);
        self.components.truncate(kept * width);
    }

    fn row(&self, index: usize) -> &[NonNull<u8>] {
        let width = self.column_count();
        &self.components[index * width..(index + 1) * width]
    }

    /// Map each requested type to its column.
    fn resolve(&self, wanted: Vec<TypeId>) -> Option<Vec<usize>> {
        let mut columns = Vec::with_capacity(wanted.len());

        for rust_type in wanted {
            let column = self.columns.iter().position(|info| info.rust_type() == rust_type)?;
            if columns.contains(&column) {
                return None;
            }
            columns.push(column);
        }

        Some(columns)
    }
}

/// A tuple of component types which can be fetched from a query row.
///
/// `Item` is a tuple of mutable references, one per type.
///
/// # Safety
/// `fetch` must only produce references of the types named by `rust_types`,
/// in the same order.
pub unsafe trait Fetch<'a> {
    /// The references produced for one row.
    type Item;

    /// The Rust type of each element.
    fn rust_types() -> Vec<TypeId>;

    /// Produce the references for one row.
    ///
    /// # Safety
    /// `row[columns[i]]` must point to a live value of the `i`th type, the
    /// columns must be distinct and nothing else may access the values for
    /// `'a`.
    unsafe fn fetch(row: &[NonNull<u8>], columns: &[usize]) -> Self::Item;
}

macro_rules! impl_fetch {
    ($(($t:ident, $idx:tt)),*) => {
        unsafe impl<'a, $($t: Component),*> Fetch<'a> for ($($t,)*) {
            type Item = ($(&'a mut $t,)*);

            fn rust_types() -> Vec<TypeId> {
                vec![$(TypeId::of::<$t>()),*]
            }

            unsafe fn fetch(row: &[NonNull<u8>], columns: &[usize]) -> Self::Item {
                ($(&mut *(row[columns[$idx]].as_ptr() as *mut $t),)*)
            }
        }
    };
}

impl_fetch!((A, 0));
impl_fetch!((A, 0), (B, 1));
impl_fetch!((A, 0), (B, 1), (C, 2));
impl_fetch!((A, 0), (B, 1), (C, 2), (D, 3));
impl_fetch!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_fetch!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_fetch!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_fetch!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Position(f32);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Velocity(f32);
    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Frozen;

    #[test]
    fn test_builder_disjoint() {
        let registry = TypeRegistry::new();
        let p = registry.type_of::<Position>();
        let v = registry.type_of::<Velocity>();

        let query = EntityQuery::new().with::<Velocity>(&registry).with::<Position>(&registry);
        assert_eq!(query.required_types(), &[p, v]);

        let query = query.without::<Position>(&registry);
        assert_eq!(query.required_types(), &[v]);
        assert_eq!(query.excluded_types(), &[p]);

        let query = query.with_type(p).with_type(p);
        assert_eq!(query.required_types(), &[p, v]);
        assert!(query.excluded_types().is_empty());
    }

    #[test]
    fn test_cancellation() {
        let registry = TypeRegistry::new();
        let t = registry.type_of::<Position>();

        let query = EntityQuery::new().with_type(t).without_type(t);
        assert!(query.required_types().is_empty());
        assert_eq!(query.excluded_types(), &[t]);

        let archetype = EntityArchetype::new::<(Velocity,)>(&registry).unwrap();
        assert!(!query.matches(&archetype));
    }

    #[test]
    fn test_matches() {
        let registry = TypeRegistry::new();
        let pv = EntityArchetype::new::<(Position, Velocity)>(&registry).unwrap();
        let pvf = pv.with_component::<Frozen>(&registry);

        let query = EntityQuery::from_archetype(&pv).without::<Frozen>(&registry);
        assert!(query.matches(&pv));
        assert!(!query.matches(&pvf));
        assert!(EntityQuery::from_archetype(&pv).matches(&pvf));
    }

    fn populate() -> (ComponentManager, Vec<Entity>) {
        let registry = Rc::new(TypeRegistry::new());
        let mut components = ComponentManager::new(registry.clone());
        let moving = components.add_archetype(&EntityArchetype::new::<(Position, Velocity)>(&registry).unwrap()).unwrap();
        let frozen = components.add_archetype(&EntityArchetype::new::<(Position, Velocity, Frozen)>(&registry).unwrap()).unwrap();

        let mut entities = Vec::new();
        for id in 1..=6 {
            let entity = Entity::new(id, 0);
            let archetype = if id % 3 == 0 { frozen } else { moving };
            components.add_entity(entity, archetype);
            *components.component_mut::<Position>(entity).unwrap() = Position(id as f32);
            *components.component_mut::<Velocity>(entity).unwrap() = Velocity(0.5);
            entities.push(entity);
        }

        (components, entities)
    }

    #[test]
    fn test_for_each() {
        let (mut components, _) = populate();
        let registry = components.registry().clone();
        let query = EntityQuery::new()
            .with::<Position>(&registry)
            .with::<Velocity>(&registry)
            .without::<Frozen>(&registry);

        let mut result = components.query(&query);
        assert_eq!(result.len(), 4);
        result.for_each::<(Velocity, Position), _>(|(velocity, position)| {
            position.0 += velocity.0;
        });

        let mut seen = Vec::new();
        result.for_each_with_entity::<(Position,), _>(|entity, (position,)| seen.push((entity.id(), position.0)));
        assert_eq!(seen, vec![(1, 1.5), (2, 2.5), (4, 4.5), (5, 5.5)]);

        assert_eq!(components.component::<Position>(Entity::new(3, 0)), Some(&Position(3.0)));
        assert_eq!(components.component::<Position>(Entity::new(4, 0)), Some(&Position(4.5)));
    }

    #[test]
    fn test_missing_and_repeated_types() {
        let (mut components, _) = populate();
        let registry = components.registry().clone();
        let query = EntityQuery::new().with::<Position>(&registry);
        let mut result = components.query(&query);

        let mut calls = 0;
        result.for_each::<(Velocity,), _>(|_| calls += 1);
        result.for_each::<(Position, Position), _>(|_| calls += 1);
        assert_eq!(calls, 0);

        assert!(result.get::<(Position, Position)>(0).is_none());
        assert!(result.get::<(Position,)>(result.len()).is_none());
        let (position,) = result.get::<(Position,)>(0).unwrap();
        assert_eq!(*position, Position(1.0));
    }

    #[test]
    fn test_at_and_columns() {
        let (mut components, entities) = populate();
        let registry = components.registry().clone();
        let p = registry.type_of::<Position>();
        let v = registry.type_of::<Velocity>();
        let f = registry.type_of::<Frozen>();

        let query = EntityQuery::new().with_types(&[v, p]).with_type(f);
        let result = components.query(&query);
        assert_eq!(result.entities(), &[entities[2], entities[5]]);
        assert_eq!(result.column_types(), &[p, v, f]);
        assert_eq!(result.type_index(v), Some(1));
        assert!(result.contains_all(&[p, f]));

        let (entity, row) = result.at(1).unwrap();
        assert_eq!(entity, entities[5]);
        assert_eq!(row.len(), 3);
        assert_eq!(unsafe { *(row[0].as_ptr() as *const Position) }, Position(6.0));
        assert!(result.at(2).is_none());
    }

    #[test]
    fn test_filter() {
        let (mut components, _) = populate();
        let registry = components.registry().clone();
        let query = EntityQuery::new().with::<Position>(&registry).with::<Velocity>(&registry);

        let mut result = components.query(&query);
        result.filter::<Position, _>(|position| position.0 > 2.0 && position.0 != 5.0);
        let ids: Vec<usize> = result.entities().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![4, 3, 6]);
        assert_eq!(result.components().len(), 6);

        let mut values = Vec::new();
        result.for_each::<(Position,), _>(|(position,)| values.push(position.0));
        assert_eq!(values, vec![4.0, 3.0, 6.0]);

        result.filter::<Frozen, _>(|_| true);
        assert!(result.is_empty());
    }
}
