//! An archetype-based entity component store.
//!
//! Entities with the same set of component types share one densely packed
//! `ComponentStore`. Queries find the matching stores through a per-type index
//! and hand back typed views over the components in place.

pub use archetype::{ComponentSet, EntityArchetype, SlotLayout};
pub use component::{
    Component,
    ComponentInfo,
    ComponentTypeID,
    TypeRegistry,
};
pub use component_manager::{ArchetypeId, ComponentManager};
pub use config::StoreConfig;
pub use entity::{Entity, EntityManager};
pub use error::ArchetypeError;
pub use query::{EntityQuery, Fetch, QueryResult};
pub use store::ComponentStore;
pub use system::{PassSystems, System, SystemManager, SystemParameters};
pub use world::World;

pub mod component;
pub mod archetype;
pub mod config;
pub mod error;
mod buffer;

pub mod store;
pub mod component_manager;
pub mod entity;
pub mod query;

pub mod system;
pub mod world;
