use serde::{Deserialize, Serialize};

use super::types::{CollectionName, Document, DocumentId, FeedPosition, OpType};

/// A classified data-mutation event from the change feed.
///
/// Events for one collection arrive in a single total order; the dispatcher
/// relies on that order to keep every subscription's matched set consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
  /// The mutation category.
  pub op: OpType,

  /// `_id` of the affected document.
  pub document_id: DocumentId,

  /// Post-image of the document. Absent on delete, and may be absent on
  /// update when the source does not look up the full document.
  pub full_document: Option<Document>,

  /// Collection the document lives in.
  pub collection: CollectionName,

  /// Where the write sits in the feed, when the source reports it.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub position: Option<FeedPosition>,
}

impl ChangeEvent {
  pub fn insert(collection: impl Into<CollectionName>, doc: Document) -> Option<Self> {
    Self::with_document(OpType::Insert, collection, doc)
  }

  pub fn update(collection: impl Into<CollectionName>, doc: Document) -> Option<Self> {
    Self::with_document(OpType::Update, collection, doc)
  }

  pub fn replace(collection: impl Into<CollectionName>, doc: Document) -> Option<Self> {
    Self::with_document(OpType::Replace, collection, doc)
  }

  pub fn delete(collection: impl Into<CollectionName>, id: impl Into<DocumentId>) -> Self {
    Self {
      op: OpType::Delete,
      document_id: id.into(),
      full_document: None,
      collection: collection.into(),
      position: None,
    }
  }

  /// Build an event whose id is taken from the document's `_id`.
  /// Returns `None` when the document has no id.
  fn with_document(
    op: OpType,
    collection: impl Into<CollectionName>,
    doc: Document,
  ) -> Option<Self> {
    let document_id = DocumentId::of(&doc)?;
    Some(Self {
      op,
      document_id,
      full_document: Some(doc),
      collection: collection.into(),
      position: None,
    })
  }

  /// Stamp the event with its feed position.
  pub fn at(mut self, position: FeedPosition) -> Self {
    self.position = Some(position);
    self
  }

  /// Application event name, e.g. `database.users.created`.
  pub fn app_event_name(&self) -> String {
    format!("database.{}.{}", self.collection, self.op.event_verb())
  }

  #[inline]
  pub fn is_delete(&self) -> bool {
    matches!(self.op, OpType::Delete)
  }
}

/// Administrative (non-data) change-stream event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AdminKind {
  Create,
  Drop,
  DropDatabase,
  Rename,
  Modify,
  CreateIndexes,
  DropIndexes,
  ShardCollection,
  ReshardCollection,
  RefineCollectionShardKey,
}

impl AdminKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      AdminKind::Create => "create",
      AdminKind::Drop => "drop",
      AdminKind::DropDatabase => "dropDatabase",
      AdminKind::Rename => "rename",
      AdminKind::Modify => "modify",
      AdminKind::CreateIndexes => "createIndexes",
      AdminKind::DropIndexes => "dropIndexes",
      AdminKind::ShardCollection => "shardCollection",
      AdminKind::ReshardCollection => "reshardCollection",
      AdminKind::RefineCollectionShardKey => "refineCollectionShardKey",
    }
  }
}

/// A change-stream item before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum RawChange {
  /// insert / update / replace / delete.
  Data(ChangeEvent),
  /// The stream can no longer continue and must be reopened.
  Invalidate,
  /// Schema or administrative change, never forwarded.
  Admin {
    kind: AdminKind,
    collection: Option<CollectionName>,
  },
}
