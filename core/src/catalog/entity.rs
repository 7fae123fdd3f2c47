use dashmap::DashMap;
use shared::config::CatalogConfig;
use shared::error::{Result, RivuletError};
use shared::event::CollectionName;
use std::sync::Arc;
use tracing::debug;

use crate::filter::FilterExpr;

/// Identifies a subtype stored in a shared base collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscriminatorMapping {
  /// Document field holding the subtype tag (usually `__t`).
  pub key: String,
  /// Tag value for this subtype.
  pub value: String,
  /// `true` for the base type itself, which sees every document.
  pub is_root: bool,
}

/// A registered entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
  pub name: String,
  pub collection: CollectionName,
  /// Base entity type for subtypes.
  pub base: Option<String>,
  pub discriminator: Option<DiscriminatorMapping>,
}

impl EntityDescriptor {
  /// The `{key: value}` constraint a subtype adds to every query.
  pub fn constraint(&self) -> Option<FilterExpr> {
    self
      .discriminator
      .as_ref()
      .filter(|d| !d.is_root)
      .map(|d| FilterExpr::field_eq(d.key.clone(), d.value.clone()))
  }

  pub fn is_subtype(&self) -> bool {
    self.base.is_some()
  }
}

/// Registry of entity types.
///
/// Populated once at startup (from configuration or explicit
/// registration) and read on every handshake.
pub struct EntityCatalog {
  discriminator_key: String,
  /// Entity name → descriptor.
  entities: DashMap<String, Arc<EntityDescriptor>>,
  /// Collection → root entity name.
  roots: DashMap<CollectionName, String>,
  /// (root entity, discriminator value) → subtype name.
  subtypes: DashMap<(String, String), String>,
}

impl EntityCatalog {
  pub fn new(discriminator_key: impl Into<String>) -> Self {
    Self {
      discriminator_key: discriminator_key.into(),
      entities: DashMap::new(),
      roots: DashMap::new(),
      subtypes: DashMap::new(),
    }
  }

  /// Build from the `[catalog]` configuration section.
  pub fn from_config(cfg: &CatalogConfig) -> Result<Self> {
    let catalog = Self::new(cfg.discriminator_key.clone());
    for entity in cfg.entities.iter().filter(|e| e.base.is_none()) {
      let collection = entity.collection.clone().ok_or_else(|| RivuletError::ConfigInvalid {
        key: format!("catalog.entities.{}.collection", entity.name),
        reason: "root entities must name a collection".into(),
      })?;
      catalog.register_root(&entity.name, collection)?;
    }
    for entity in cfg.entities.iter() {
      if let Some(base) = &entity.base {
        let value = entity.discriminator.clone().unwrap_or_else(|| entity.name.clone());
        catalog.register_subtype(&entity.name, base, value)?;
      }
    }
    Ok(catalog)
  }

  /// Register an entity type backed by its own collection.
  pub fn register_root(&self, name: &str, collection: impl Into<CollectionName>) -> Result<()> {
    let collection = collection.into();
    if self.entities.contains_key(name) {
      return Err(RivuletError::Validation(format!(
        "entity type '{}' is already registered",
        name
      )));
    }
    if let Some(existing) = self.roots.get(&collection) {
      return Err(RivuletError::Validation(format!(
        "collection '{}' is already bound to '{}'",
        collection,
        existing.value()
      )));
    }

    let descriptor = EntityDescriptor {
      name: name.to_string(),
      collection: collection.clone(),
      base: None,
      discriminator: Some(DiscriminatorMapping {
        key: self.discriminator_key.clone(),
        value: name.to_string(),
        is_root: true,
      }),
    };
    self.roots.insert(collection.clone(), name.to_string());
    self.entities.insert(name.to_string(), Arc::new(descriptor));
    debug!(entity = name, collection = %collection, "registered entity type");
    Ok(())
  }

  /// Register a subtype stored in `base`'s collection under `value`.
  pub fn register_subtype(&self, name: &str, base: &str, value: impl Into<String>) -> Result<()> {
    let value = value.into();
    if self.entities.contains_key(name) {
      return Err(RivuletError::Validation(format!(
        "entity type '{}' is already registered",
        name
      )));
    }
    let root = self.get(base)?;
    if root.is_subtype() {
      return Err(RivuletError::Validation(format!(
        "'{}' cannot extend subtype '{}'",
        name, base
      )));
    }

    let key = (base.to_string(), value.clone());
    if self.subtypes.contains_key(&key) {
      return Err(RivuletError::Validation(format!(
        "discriminator '{}' is already defined on '{}'",
        value, base
      )));
    }

    let descriptor = EntityDescriptor {
      name: name.to_string(),
      collection: root.collection.clone(),
      base: Some(base.to_string()),
      discriminator: Some(DiscriminatorMapping {
        key: self.discriminator_key.clone(),
        value: value.clone(),
        is_root: false,
      }),
    };
    self.subtypes.insert(key, name.to_string());
    self.entities.insert(name.to_string(), Arc::new(descriptor));
    debug!(entity = name, base, discriminator = %value, "registered subtype");
    Ok(())
  }

  /// Look up an entity type by name.
  pub fn get(&self, name: &str) -> Result<Arc<EntityDescriptor>> {
    self
      .entities
      .get(name)
      .map(|e| Arc::clone(e.value()))
      .ok_or_else(|| RivuletError::UnknownEntity(name.to_string()))
  }

  /// Resolve a handshake target: the collection's root entity, or the
  /// subtype selected by `discriminator`.
  pub fn resolve(
    &self,
    collection: &CollectionName,
    discriminator: Option<&str>,
  ) -> Result<Arc<EntityDescriptor>> {
    let root = self
      .roots
      .get(collection)
      .map(|r| r.value().clone())
      .ok_or_else(|| RivuletError::UnknownCollection(collection.to_string()))?;

    match discriminator {
      None => self.get(&root),
      Some(d) if d == root => self.get(&root),
      Some(d) => {
        let name = self
          .subtypes
          .get(&(root.clone(), d.to_string()))
          .map(|s| s.value().clone())
          .ok_or_else(|| RivuletError::UnknownDiscriminator {
            entity: root.clone(),
            discriminator: d.to_string(),
          })?;
        self.get(&name)
      }
    }
  }

  pub fn discriminator_key(&self) -> &str {
    &self.discriminator_key
  }

  /// Every collection that has a registered root entity.
  pub fn collections(&self) -> Vec<CollectionName> {
    let mut out: Vec<_> = self.roots.iter().map(|e| e.key().clone()).collect();
    out.sort();
    out
  }

  pub fn len(&self) -> usize {
    self.entities.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entities.is_empty()
  }
}
