use async_trait::async_trait;
use serde_json::Value;
use shared::error::{Result, RivuletError};
use shared::session::UserContext;
use std::fmt;

use crate::filter::{parse_filter, FilterExpr};

/// The four guarded operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  Create,
  Read,
  Update,
  Delete,
}

impl Operation {
  pub fn as_str(&self) -> &'static str {
    match self {
      Operation::Create => "canCreate",
      Operation::Read => "canRead",
      Operation::Update => "canUpdate",
      Operation::Delete => "canDelete",
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Result of evaluating one rule operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
  Allow,
  Deny,
  /// Allowed, restricted to documents matching the predicate.
  Filter(FilterExpr),
}

impl RuleOutcome {
  /// Interpret a JSON rule result: `true`, `false` or a filter object.
  pub fn from_json(value: &Value) -> Result<Self> {
    match value {
      Value::Bool(true) => Ok(RuleOutcome::Allow),
      Value::Bool(false) => Ok(RuleOutcome::Deny),
      Value::Object(_) => Ok(RuleOutcome::Filter(parse_filter(value)?)),
      other => Err(RivuletError::Validation(format!(
        "rule must return a boolean or a filter object, got {}",
        other
      ))),
    }
  }
}

impl From<bool> for RuleOutcome {
  fn from(allow: bool) -> Self {
    if allow {
      RuleOutcome::Allow
    } else {
      RuleOutcome::Deny
    }
  }
}

impl From<FilterExpr> for RuleOutcome {
  fn from(f: FilterExpr) -> Self {
    RuleOutcome::Filter(f)
  }
}

/// Access rule for one entity type.
///
/// Every operation defaults to allow. Implementations may suspend; they are
/// awaited at handshake time and by the document authorization helpers,
/// never while dispatching change events.
#[async_trait]
pub trait AccessRule: Send + Sync {
  async fn can_create(&self, _user: &UserContext) -> Result<RuleOutcome> {
    Ok(RuleOutcome::Allow)
  }

  async fn can_read(&self, _user: &UserContext) -> Result<RuleOutcome> {
    Ok(RuleOutcome::Allow)
  }

  async fn can_update(&self, _user: &UserContext) -> Result<RuleOutcome> {
    Ok(RuleOutcome::Allow)
  }

  async fn can_delete(&self, _user: &UserContext) -> Result<RuleOutcome> {
    Ok(RuleOutcome::Allow)
  }

  async fn check(&self, op: Operation, user: &UserContext) -> Result<RuleOutcome> {
    match op {
      Operation::Create => self.can_create(user).await,
      Operation::Read => self.can_read(user).await,
      Operation::Update => self.can_update(user).await,
      Operation::Delete => self.can_delete(user).await,
    }
  }
}

/// A rule with a fixed outcome per operation.
#[derive(Debug, Clone)]
pub struct StaticRule {
  create: RuleOutcome,
  read: RuleOutcome,
  update: RuleOutcome,
  delete: RuleOutcome,
}

impl Default for StaticRule {
  fn default() -> Self {
    Self {
      create: RuleOutcome::Allow,
      read: RuleOutcome::Allow,
      update: RuleOutcome::Allow,
      delete: RuleOutcome::Allow,
    }
  }
}

impl StaticRule {
  pub fn new() -> Self {
    Self::default()
  }

  /// Deny every operation.
  pub fn deny_all() -> Self {
    Self {
      create: RuleOutcome::Deny,
      read: RuleOutcome::Deny,
      update: RuleOutcome::Deny,
      delete: RuleOutcome::Deny,
    }
  }

  pub fn create(mut self, outcome: impl Into<RuleOutcome>) -> Self {
    self.create = outcome.into();
    self
  }

  pub fn read(mut self, outcome: impl Into<RuleOutcome>) -> Self {
    self.read = outcome.into();
    self
  }

  pub fn update(mut self, outcome: impl Into<RuleOutcome>) -> Self {
    self.update = outcome.into();
    self
  }

  pub fn delete(mut self, outcome: impl Into<RuleOutcome>) -> Self {
    self.delete = outcome.into();
    self
  }
}

#[async_trait]
impl AccessRule for StaticRule {
  async fn check(&self, op: Operation, _user: &UserContext) -> Result<RuleOutcome> {
    Ok(match op {
      Operation::Create => self.create.clone(),
      Operation::Read => self.read.clone(),
      Operation::Update => self.update.clone(),
      Operation::Delete => self.delete.clone(),
    })
  }
}

/// A rule computed from the caller's identity by a closure.
pub struct FnRule<F> {
  f: F,
}

impl<F> FnRule<F>
where
  F: Fn(Operation, &UserContext) -> Result<RuleOutcome> + Send + Sync,
{
  pub fn new(f: F) -> Self {
    Self { f }
  }
}

#[async_trait]
impl<F> AccessRule for FnRule<F>
where
  F: Fn(Operation, &UserContext) -> Result<RuleOutcome> + Send + Sync,
{
  async fn check(&self, op: Operation, user: &UserContext) -> Result<RuleOutcome> {
    (self.f)(op, user)
  }
}
