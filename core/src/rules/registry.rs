use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use super::rule::AccessRule;

/// Looks up the access rule registered for an entity type.
pub trait RuleProvider: Send + Sync {
  fn lookup(&self, entity: &str) -> Option<Arc<dyn AccessRule>>;
}

/// Rules registered explicitly at startup, keyed by entity type name.
#[derive(Default)]
pub struct RuleRegistry {
  rules: DashMap<String, Arc<dyn AccessRule>>,
}

impl RuleRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register (or replace) the rule for `entity`.
  pub fn register(&self, entity: impl Into<String>, rule: Arc<dyn AccessRule>) {
    let entity = entity.into();
    if self.rules.insert(entity.clone(), rule).is_some() {
      debug!(entity = %entity, "replaced access rule");
    } else {
      debug!(entity = %entity, "registered access rule");
    }
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }
}

impl RuleProvider for RuleRegistry {
  fn lookup(&self, entity: &str) -> Option<Arc<dyn AccessRule>> {
    self.rules.get(entity).map(|r| Arc::clone(r.value()))
  }
}
