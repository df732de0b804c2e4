//! Errors raised while building archetypes.
//!
//! Everything else in this crate reports failure through `Option` or `bool`.

use std::alloc::LayoutError;

use thiserror::Error;

use crate::component::ComponentTypeID;

/// The error returned when an archetype, or the store for one, cannot be
/// constructed.
#[derive(Debug, Error)]
pub enum ArchetypeError {
    /// The same component type was listed more than once.
    #[error("component type `{name}` is listed more than once")]
    DuplicateComponent {
        /// The name of the repeated component type.
        name: &'static str,
    },

    /// The component type ID was not issued by the registry in use.
    #[error("component type {0:?} is not registered")]
    UnknownComponent(ComponentTypeID),

    /// The combined slot layout of the components is not representable.
    #[error("invalid slot layout: {0}")]
    Layout(#[from] LayoutError),

    /// A store of the requested capacity would not fit in memory.
    #[error("component store capacity overflow")]
    CapacityOverflow,
}
