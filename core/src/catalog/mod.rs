//! Entity catalog: which entity types exist, where they are stored and how
//! subtypes sharing a base collection are told apart.

pub mod entity;

pub use entity::{DiscriminatorMapping, EntityCatalog, EntityDescriptor};
