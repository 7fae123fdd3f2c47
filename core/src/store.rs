use async_trait::async_trait;
use shared::error::Result;
use shared::event::{Document, DocumentId, FeedPosition};

use crate::catalog::EntityDescriptor;
use crate::filter::FilterExpr;

/// A store read together with the feed position it reflects.
///
/// `as_of` is `None` when the store cannot tell; subscriptions seeded from
/// such a read replay every feed event that arrives while seeding.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
  pub value: T,
  pub as_of: Option<FeedPosition>,
}

impl<T> Versioned<T> {
  pub fn unversioned(value: T) -> Self {
    Self { value, as_of: None }
  }

  pub fn at(value: T, position: FeedPosition) -> Self {
    Self {
      value,
      as_of: Some(position),
    }
  }
}

/// Read access to the document store.
///
/// Only used to seed a subscription's initial snapshot; live updates come
/// from the change feed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// Every document of `entity`'s collection matching `filter`.
  async fn query(
    &self,
    entity: &EntityDescriptor,
    filter: &FilterExpr,
  ) -> Result<Versioned<Vec<Document>>>;

  /// The document with `id`, or `None`.
  async fn find_by_id(
    &self,
    entity: &EntityDescriptor,
    id: &DocumentId,
  ) -> Result<Versioned<Option<Document>>>;
}
