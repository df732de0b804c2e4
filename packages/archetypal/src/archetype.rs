//! Archetypes are the 'layout' of entities, containing a list of the attached components.

use std::alloc::Layout;
use std::hash::{Hash, Hasher};

use crate::component::{Component, ComponentInfo, ComponentTypeID, TypeRegistry};
use crate::error::ArchetypeError;

/// A statically known list of component types, implemented for tuples of
/// components.
///
/// This is how archetypes are declared in code:
/// `EntityArchetype::new::<(Position, Velocity)>(&registry)`.
pub trait ComponentSet {
    /// Register every type in the set and return their infos, in declaration
    /// order.
    fn component_infos(registry: &TypeRegistry) -> Vec<ComponentInfo>;
}

macro_rules! impl_component_set {
    ($($t:ident),*) => {
        impl<$($t: Component),*> ComponentSet for ($($t,)*) {
            fn component_infos(_registry: &TypeRegistry) -> Vec<ComponentInfo> {
                vec![$(_registry.register::<$t>()),*]
            }
        }
    };
}

impl_component_set!();
impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

/// An archetype represents a particular layout of an entity.
///
/// It is an immutable *set* of component types: two archetypes built from the
/// same types in a different order are equal and hash identically. The
/// component infos are kept sorted by `ComponentTypeID`.
#[derive(Clone, Debug)]
pub struct EntityArchetype {
    component_types: Vec<ComponentTypeID>,
    infos: Vec<ComponentInfo>,
}

impl EntityArchetype {
    /// Create an archetype from a tuple of component types.
    ///
    /// Listing a type twice is an error.
    pub fn new<S: ComponentSet>(registry: &TypeRegistry) -> Result<EntityArchetype, ArchetypeError> {
        EntityArchetype::from_infos(S::component_infos(registry))
    }

    /// Create an archetype from a list of registered component type IDs.
    pub fn from_types(registry: &TypeRegistry, component_types: &[ComponentTypeID]) -> Result<EntityArchetype, ArchetypeError> {
        let infos = component_types.iter()
            .map(|ty| registry.info(*ty).ok_or(ArchetypeError::UnknownComponent(*ty)))
            .collect::<Result<Vec<_>, _>>()?;
        EntityArchetype::from_infos(infos)
    }

    /// Create an archetype from component infos.
    pub fn from_infos(mut infos: Vec<ComponentInfo>) -> Result<EntityArchetype, ArchetypeError> {
        infos.sort_by_key(|info| info.type_id());

        if let Some(pair) = infos.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ArchetypeError::DuplicateComponent { name: pair[0].name() });
        }

        // Reject layouts which could never be allocated up front.
        SlotLayout::calculate(&infos)?;

        Ok(EntityArchetype::from_sorted(infos))
    }

    /// Create the archetype with no components.
    pub fn empty() -> EntityArchetype {
        EntityArchetype::from_sorted(Vec::new())
    }

    fn from_sorted(infos: Vec<ComponentInfo>) -> EntityArchetype {
        let component_types = infos.iter().map(|info| info.type_id()).collect();
        EntityArchetype {
            component_types,
            infos,
        }
    }

    /// Return the sorted list of component types in this archetype.
    pub fn component_types(&self) -> &[ComponentTypeID] {
        &self.component_types
    }

    /// Return the component infos, sorted by type ID.
    pub fn component_infos(&self) -> &[ComponentInfo] {
        &self.infos
    }

    /// Return the number of component types in this archetype.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns true if this archetype has no components.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Return the index of a component type in the sorted type list.
    pub fn index_of(&self, component_type: ComponentTypeID) -> Option<usize> {
        self.component_types.binary_search(&component_type).ok()
    }

    /// Returns true if this archetype contains the given component.
    pub fn has_component(&self, component_type: ComponentTypeID) -> bool {
        self.index_of(component_type).is_some()
    }

    /// Returns true if this archetype contains all of the given component types.
    pub fn has_all_components(&self, component_types: &[ComponentTypeID]) -> bool {
        component_types.iter().all(|ty| self.has_component(*ty))
    }

    /// Fetch the metadata of a component type in this archetype.
    pub fn component_info(&self, component_type: ComponentTypeID) -> Option<&ComponentInfo> {
        self.index_of(component_type).map(|idx| &self.infos[idx])
    }

    /// Derive a new archetype with a component type added.
    pub fn with(&self, info: ComponentInfo) -> EntityArchetype {
        match self.component_types.binary_search(&info.type_id()) {
            Ok(_) => self.clone(),
            Err(idx) => {
                let mut infos = self.infos.clone();
                infos.insert(idx, info);
                EntityArchetype::from_sorted(infos)
            }
        }
    }

    /// Derive a new archetype with a component type removed.
    pub fn without(&self, component_type: ComponentTypeID) -> EntityArchetype {
        match self.index_of(component_type) {
            Some(idx) => {
                let mut infos = self.infos.clone();
                infos.remove(idx);
                EntityArchetype::from_sorted(infos)
            }
            None => self.clone(),
        }
    }

    /// Derive a new archetype with the component type `T` added.
    pub fn with_component<T: Component>(&self, registry: &TypeRegistry) -> EntityArchetype {
        self.with(registry.register::<T>())
    }

    /// Derive a new archetype with the component type `T` removed.
    pub fn without_component<T: Component>(&self, registry: &TypeRegistry) -> EntityArchetype {
        match registry.lookup::<T>() {
            Some(ty) => self.without(ty),
            None => self.clone(),
        }
    }

    /// A readable name for this archetype, such as `Position|Velocity`.
    pub fn identifier(&self) -> String {
        let names: Vec<&str> = self.infos.iter()
            .map(|info| info.name().rsplit("::").next().unwrap_or_else(|| info.name()))
            .collect();
        names.join("|")
    }
}

impl PartialEq for EntityArchetype {
    fn eq(&self, other: &EntityArchetype) -> bool {
        self.component_types == other.component_types
    }
}

impl Eq for EntityArchetype {}

impl Hash for EntityArchetype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.component_types.hash(state)
    }
}

impl Default for EntityArchetype {
    fn default() -> Self {
        EntityArchetype::empty()
    }
}

/// The byte layout of one entity slot in a component store.
///
/// Every component of the archetype lives at a fixed offset within the slot.
/// Components are placed in decreasing alignment order, so the only padding is
/// at the end of the slot, which rounds the stride up to the strictest
/// alignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    offsets: Vec<usize>,
    stride: usize,
    align: usize,
}

impl SlotLayout {
    /// Calculate the slot layout for a sorted list of component infos.
    ///
    /// `offsets()` is indexed the same way as `infos`.
    pub fn calculate(infos: &[ComponentInfo]) -> Result<SlotLayout, ArchetypeError> {
        let mut order: Vec<usize> = (0..infos.len()).collect();
        order.sort_by(|a, b| infos[*b].align().cmp(&infos[*a].align()).then(a.cmp(b)));

        let mut offsets = vec![0; infos.len()];
        let mut slot = Layout::from_size_align(0, 1)?;

        for idx in order {
            let (extended, offset) = slot.extend(infos[idx].layout())?;
            offsets[idx] = offset;
            slot = extended;
        }

        let slot = slot.pad_to_align();
        Ok(SlotLayout {
            offsets,
            stride: slot.size(),
            align: slot.align(),
        })
    }

    /// Return the layout of an archetype's slot.
    pub fn for_archetype(archetype: &EntityArchetype) -> Result<SlotLayout, ArchetypeError> {
        SlotLayout::calculate(archetype.component_infos())
    }

    /// The byte offset of each component, in archetype order.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The byte size of one slot.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The strictest alignment of any component in the slot.
    pub fn align(&self) -> usize {
        self.align
    }

    /// The memory layout of a buffer holding `capacity` slots.
    pub fn buffer_layout(&self, capacity: usize) -> Option<Layout> {
        let size = self.stride.checked_mul(capacity)?;
        Layout::from_size_align(size, self.align).ok()
    }
}
