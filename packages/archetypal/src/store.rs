//! Dense storage for the components of every entity in one archetype.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::mem;
use std::ptr::NonNull;

use tracing::{debug, trace};

use crate::archetype::{EntityArchetype, SlotLayout};
use crate::buffer::AlignedBuffer;
use crate::component::{Component, ComponentTypeID};
use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::error::ArchetypeError;

/// The components of every entity belonging to one archetype.
///
/// Storage is row-oriented: each resident entity owns one fixed-size slot in a
/// single aligned buffer, and slots are kept dense (slot `i` belongs to
/// `entities()[i]`). Erasing an entity moves the last slot into the hole.
///
/// Pointers handed out by a store are only valid until the next `insert`,
/// `erase`, migration or growth of that store.
pub struct ComponentStore {
    archetype: EntityArchetype,
    layout: SlotLayout,
    buffer: AlignedBuffer,
    capacity: usize,
    growth_factor: usize,
    entities: Vec<Entity>,
    slots: HashMap<Entity, usize>,
}

impl ComponentStore {
    /// Create an empty store for an archetype.
    ///
    /// # Panics
    ///
    /// Panics if the archetype's slot layout or the initial buffer cannot be
    /// represented. See `try_new`.
    pub fn new(archetype: EntityArchetype, config: &StoreConfig) -> ComponentStore {
        match ComponentStore::try_new(archetype, config) {
            Ok(store) => store,
            Err(err) => panic!("cannot create component store: {}", err),
        }
    }

    /// Create an empty store for an archetype, failing if its slot layout or
    /// initial buffer cannot be represented.
    pub fn try_new(archetype: EntityArchetype, config: &StoreConfig) -> Result<ComponentStore, ArchetypeError> {
        let layout = SlotLayout::for_archetype(&archetype)?;
        let capacity = config.initial_capacity();
        let buffer_layout = layout.buffer_layout(capacity).ok_or(ArchetypeError::CapacityOverflow)?;
        let buffer = AlignedBuffer::with_layout(buffer_layout);

        Ok(ComponentStore {
            archetype,
            layout,
            buffer,
            capacity,
            growth_factor: config.growth_factor(),
            entities: Vec::new(),
            slots: HashMap::new(),
        })
    }

    /// Return the archetype of every entity in this store.
    pub fn archetype(&self) -> &EntityArchetype {
        &self.archetype
    }

    /// Return the slot layout used by this store.
    pub fn layout(&self) -> &SlotLayout {
        &self.layout
    }

    /// Get the entities resident in this store, in slot order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Get the number of resident entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if no entities are resident.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get the number of slots allocated.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the entity is resident in this store.
    pub fn contains(&self, entity: Entity) -> bool {
        self.slots.contains_key(&entity)
    }

    /// Return the slot index of a resident entity.
    pub fn slot_index(&self, entity: Entity) -> Option<usize> {
        self.slots.get(&entity).copied()
    }

    /// Insert an entity, default-constructing each of its components.
    ///
    /// Returns false if the entity is already resident.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.contains(entity) {
            return false;
        }

        self.reserve(1);
        let index = self.entities.len();
        for (column, info) in self.archetype.component_infos().iter().enumerate() {
            unsafe { info.construct(self.slot_ptr(index, column)) };
        }

        self.push_slot(entity, index);
        trace!(?entity, index, archetype = %self.archetype.identifier(), "inserted entity");
        true
    }

    /// Erase an entity, destroying each of its components.
    ///
    /// Returns false if the entity was not resident.
    pub fn erase(&mut self, entity: Entity) -> bool {
        let index = match self.slot_index(entity) {
            Some(index) => index,
            None => return false,
        };

        for (column, info) in self.archetype.component_infos().iter().enumerate() {
            unsafe { info.drop_in_place(self.slot_ptr(index, column)) };
        }

        self.vacate(entity, index);
        trace!(?entity, index, archetype = %self.archetype.identifier(), "erased entity");
        true
    }

    /// Get a pointer to a component of a resident entity.
    pub fn component_ptr(&self, entity: Entity, component_type: ComponentTypeID) -> Option<NonNull<u8>> {
        let index = self.slot_index(entity)?;
        let column = self.archetype.index_of(component_type)?;
        Some(unsafe { self.slot_ptr(index, column) })
    }

    /// Get a reference to a component of a resident entity.
    pub fn component<T: Component>(&self, entity: Entity) -> Option<&T> {
        let index = self.slot_index(entity)?;
        let column = self.column_of::<T>()?;
        Some(unsafe { &*(self.slot_ptr(index, column).as_ptr() as *const T) })
    }

    /// Get a mutable reference to a component of a resident entity.
    pub fn component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let index = self.slot_index(entity)?;
        let column = self.column_of::<T>()?;
        Some(unsafe { &mut *(self.slot_ptr(index, column).as_ptr() as *mut T) })
    }

    /// Move an entity's components out of another store into this one.
    ///
    /// Components whose type is in both archetypes are moved, those only in
    /// this archetype are default-constructed and those only in the source are
    /// destroyed. The entity is removed from `source`.
    ///
    /// Returns false, changing nothing, if the entity is already resident here
    /// or is not resident in `source`.
    pub fn move_components_from(&mut self, source: &mut ComponentStore, entity: Entity) -> bool {
        if self.contains(entity) {
            return false;
        }

        let source_index = match source.slot_index(entity) {
            Some(index) => index,
            None => return false,
        };

        self.reserve(1);
        let index = self.entities.len();

        for (column, info) in self.archetype.component_infos().iter().enumerate() {
            let dest = unsafe { self.slot_ptr(index, column) };
            match source.archetype.index_of(info.type_id()) {
                Some(source_column) => unsafe {
                    info.move_into(source.slot_ptr(source_index, source_column), dest)
                },
                None => unsafe { info.construct(dest) },
            }
        }

        for (source_column, info) in source.archetype.component_infos().iter().enumerate() {
            if !self.archetype.has_component(info.type_id()) {
                unsafe { info.drop_in_place(source.slot_ptr(source_index, source_column)) };
            }
        }

        self.push_slot(entity, index);
        source.vacate(entity, source_index);
        true
    }

    /// Insert `dest` as a copy of the resident entity `source`.
    ///
    /// Returns false if `source` is absent or `dest` is already resident.
    pub fn clone_entity(&mut self, source: Entity, dest: Entity) -> bool {
        if self.contains(dest) || !self.contains(source) {
            return false;
        }

        self.reserve(1);
        let index = self.entities.len();
        let source_index = self.slots[&source];

        for (column, info) in self.archetype.component_infos().iter().enumerate() {
            unsafe { info.clone_into(self.slot_ptr(source_index, column), self.slot_ptr(index, column)) };
        }

        self.push_slot(dest, index);
        true
    }

    /// Ensure there are slots for `additional` more entities.
    pub fn reserve(&mut self, additional: usize) {
        let needed = self.entities.len() + additional;
        if needed <= self.capacity {
            return;
        }

        let new_capacity = self.capacity.saturating_mul(self.growth_factor).max(needed);
        self.grow(new_capacity);
    }

    /// Pointers to the given columns of the slot at `index`, appended to `out`.
    pub(crate) fn row_ptrs(&self, index: usize, columns: &[usize], out: &mut Vec<NonNull<u8>>) {
        debug_assert!(index < self.entities.len());
        out.extend(columns.iter().map(|column| unsafe { self.slot_ptr(index, *column) }));
    }

    fn column_of<T: Component>(&self) -> Option<usize> {
        self.archetype.component_infos().iter().position(|info| info.is::<T>())
    }

    /// Reallocate the buffer to hold `new_capacity` slots, moving every
    /// resident slot to the same index in the new buffer.
    fn grow(&mut self, new_capacity: usize) {
        let buffer = AlignedBuffer::with_layout(buffer_layout(&self.layout, new_capacity));
        let stride = self.layout.stride();

        for index in 0..self.entities.len() {
            let infos = self.archetype.component_infos().iter();
            for (info, offset) in infos.zip(self.layout.offsets()) {
                let offset = index * stride + offset;
                unsafe { info.move_into(self.buffer.ptr_at(offset), buffer.ptr_at(offset)) };
            }
        }

        // Every value was moved out, so the old buffer is released without
        // running any destructors.
        let old = mem::replace(&mut self.buffer, buffer);
        debug!(
            archetype = %self.archetype.identifier(),
            old_capacity = self.capacity,
            new_capacity,
            bytes = self.buffer.layout().size(),
            "grew component store"
        );
        drop(old);
        self.capacity = new_capacity;
    }

    fn push_slot(&mut self, entity: Entity, index: usize) {
        debug_assert_eq!(index, self.entities.len());
        self.entities.push(entity);
        self.slots.insert(entity, index);
    }

    /// Release the slot at `index`, whose components have already been
    /// destroyed or moved out, by moving the last slot into it.
    fn vacate(&mut self, entity: Entity, index: usize) {
        self.slots.remove(&entity);

        let last = self.entities.len() - 1;
        if index != last {
            for (column, info) in self.archetype.component_infos().iter().enumerate() {
                unsafe { info.move_into(self.slot_ptr(last, column), self.slot_ptr(index, column)) };
            }

            let moved = self.entities[last];
            self.slots.insert(moved, index);
        }

        self.entities.swap_remove(index);
    }

    /// # Safety
    /// `index` must be below the capacity and `column` a valid archetype index.
    unsafe fn slot_ptr(&self, index: usize, column: usize) -> NonNull<u8> {
        self.buffer.ptr_at(index * self.layout.stride() + self.layout.offsets()[column])
    }
}

fn buffer_layout(layout: &SlotLayout, capacity: usize) -> std::alloc::Layout {
    match layout.buffer_layout(capacity) {
        Some(layout) => layout,
        None => panic!("component store capacity overflow"),
    }
}

impl Drop for ComponentStore {
    fn drop(&mut self) {
        for index in 0..self.entities.len() {
            for (column, info) in self.archetype.component_infos().iter().enumerate() {
                unsafe { info.drop_in_place(self.slot_ptr(index, column)) };
            }
        }
    }
}

impl Debug for ComponentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f,
               "ComponentStore {{ archetype: {}, len: {}, capacity: {}, stride: {} }}",
               self.archetype.identifier(),
               self.entities.len(),
               self.capacity,
               self.layout.stride())
    }
}
