use shared::error::{Result, RivuletError};
use shared::event::Document;
use shared::session::UserContext;
use std::sync::Arc;
use tracing::debug;

use super::registry::RuleProvider;
use super::rule::{Operation, RuleOutcome};
use crate::catalog::{EntityCatalog, EntityDescriptor};
use crate::filter::FilterExpr;

/// Evaluates access rules for an entity type, including its base type.
///
/// For subtypes the base type's rule runs first. A base-level deny ends
/// evaluation before the subtype rule is consulted; predicates from both
/// levels are AND-merged.
pub struct RuleEvaluator {
  catalog: Arc<EntityCatalog>,
  rules: Arc<dyn RuleProvider>,
}

impl RuleEvaluator {
  pub fn new(catalog: Arc<EntityCatalog>, rules: Arc<dyn RuleProvider>) -> Self {
    Self { catalog, rules }
  }

  /// Combined outcome of `op` for `entity`.
  pub async fn invoke(&self, entity: &str, user: &UserContext, op: Operation) -> Result<RuleOutcome> {
    let descriptor = self.catalog.get(entity)?;
    self.invoke_for(&descriptor, user, op).await
  }

  pub async fn invoke_for(
    &self,
    entity: &EntityDescriptor,
    user: &UserContext,
    op: Operation,
  ) -> Result<RuleOutcome> {
    let chain = entity
      .base
      .iter()
      .map(String::as_str)
      .chain(std::iter::once(entity.name.as_str()));

    let mut scope = FilterExpr::All;
    for name in chain {
      let Some(rule) = self.rules.lookup(name) else {
        continue;
      };
      match rule.check(op, user).await? {
        RuleOutcome::Allow => {}
        RuleOutcome::Deny => {
          debug!(entity = name, op = %op, "access rule denied");
          return Ok(RuleOutcome::Deny);
        }
        RuleOutcome::Filter(f) => scope = scope.and(f),
      }
    }

    Ok(if scope.is_all() {
      RuleOutcome::Allow
    } else {
      RuleOutcome::Filter(scope)
    })
  }

  /// The read predicate for a subscription, or `AccessDenied`.
  pub async fn read_scope(&self, entity: &EntityDescriptor, user: &UserContext) -> Result<FilterExpr> {
    match self.invoke_for(entity, user, Operation::Read).await? {
      RuleOutcome::Allow => Ok(FilterExpr::All),
      RuleOutcome::Filter(f) => Ok(f),
      RuleOutcome::Deny => Err(denied(&entity.name, Operation::Read)),
    }
  }

  /// Check that `user` may create or update `doc`.
  ///
  /// A predicate outcome requires the document to satisfy it.
  pub async fn authorize_document(
    &self,
    entity: &str,
    user: &UserContext,
    op: Operation,
    doc: &Document,
  ) -> Result<()> {
    if !matches!(op, Operation::Create | Operation::Update) {
      return Err(RivuletError::Validation(format!(
        "{} does not authorize document values",
        op
      )));
    }
    match self.invoke(entity, user, op).await? {
      RuleOutcome::Allow => Ok(()),
      RuleOutcome::Deny => Err(denied(entity, op)),
      RuleOutcome::Filter(f) if f.matches(doc) => Ok(()),
      RuleOutcome::Filter(_) => Err(RivuletError::ForbiddenDocument {
        entity: entity.to_string(),
        operation: op.as_str().to_string(),
      }),
    }
  }

  /// Restrict a read or delete `filter` to what `user` may touch.
  pub async fn scope_filter(
    &self,
    entity: &str,
    user: &UserContext,
    op: Operation,
    filter: FilterExpr,
  ) -> Result<FilterExpr> {
    if !matches!(op, Operation::Read | Operation::Delete) {
      return Err(RivuletError::Validation(format!(
        "{} does not scope filters",
        op
      )));
    }
    match self.invoke(entity, user, op).await? {
      RuleOutcome::Allow => Ok(filter),
      RuleOutcome::Filter(f) => Ok(filter.and(f)),
      RuleOutcome::Deny => Err(denied(entity, op)),
    }
  }
}

fn denied(entity: &str, op: Operation) -> RivuletError {
  RivuletError::AccessDenied {
    entity: entity.to_string(),
    operation: op.as_str().to_string(),
  }
}
