use async_trait::async_trait;
use rivulet_core::catalog::EntityDescriptor;
use rivulet_core::filter::FilterExpr;
use rivulet_core::store::{DocumentStore, Versioned};
use serde_json::{Map, Value};
use shared::error::{Result, RivuletError};
use shared::event::{
  AdminKind, ChangeEvent, CollectionName, Document, DocumentId, FeedPosition, OpType, RawChange,
  ID_FIELD,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::feed::StreamSender;

/// Collection → (canonical id → document).
type Collections = HashMap<CollectionName, BTreeMap<String, Document>>;

#[derive(Default)]
pub(crate) struct Inner {
  pub(crate) collections: Collections,
  pub(crate) streams: Vec<StreamSender>,
  /// Position of the last committed write.
  pub(crate) position: u64,
}

#[derive(Default)]
pub(crate) struct Faults {
  pub(crate) failing_opens: AtomicU32,
  pub(crate) fail_close: AtomicBool,
  pub(crate) opens: AtomicUsize,
  pub(crate) next_stream: AtomicU64,
}

/// In-memory document store.
///
/// Cloning is cheap; clones share the same data and open streams.
#[derive(Clone, Default)]
pub struct MemoryStore {
  pub(crate) inner: Arc<Mutex<Inner>>,
  pub(crate) faults: Arc<Faults>,
  next_id: Arc<AtomicU64>,
}

fn key(id: &DocumentId) -> String {
  id.as_value().to_string()
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Insert a document, assigning an `_id` if it has none.
  pub fn insert(&self, collection: impl Into<CollectionName>, doc: Document) -> Result<DocumentId> {
    let collection = collection.into();
    let mut doc = into_object(doc)?;
    let id = match DocumentId::of(&doc) {
      Some(id) => id,
      None => {
        let id = DocumentId::from(format!(
          "{:024x}",
          self.next_id.fetch_add(1, Ordering::Relaxed) + 1
        ));
        if let Value::Object(map) = &mut doc {
          map.insert(ID_FIELD.to_string(), id.as_value().clone());
        }
        id
      }
    };

    let mut inner = self.lock();
    let docs = inner.collections.entry(collection.clone()).or_default();
    if docs.contains_key(&key(&id)) {
      return Err(RivuletError::Validation(format!(
        "duplicate key: {} already exists in '{}'",
        id, collection
      )));
    }
    docs.insert(key(&id), doc.clone());
    let event = ChangeEvent {
      op: OpType::Insert,
      document_id: id.clone(),
      full_document: Some(doc),
      collection,
      position: None,
    };
    commit(&mut inner, event);
    Ok(id)
  }

  /// Merge `fields` into an existing document (`$set` semantics).
  ///
  /// Returns the updated document, or `None` if it does not exist.
  pub fn update(
    &self,
    collection: impl Into<CollectionName>,
    id: &DocumentId,
    fields: Value,
  ) -> Result<Option<Document>> {
    let collection = collection.into();
    let Value::Object(fields) = fields else {
      return Err(RivuletError::Validation("update fields must be an object".into()));
    };
    if fields.contains_key(ID_FIELD) {
      return Err(RivuletError::Validation("the _id field is immutable".into()));
    }

    let mut inner = self.lock();
    let Some(doc) = inner
      .collections
      .get_mut(&collection)
      .and_then(|docs| docs.get_mut(&key(id)))
    else {
      return Ok(None);
    };
    if let Value::Object(map) = doc {
      map.extend(fields);
    }
    let updated = doc.clone();
    let event = ChangeEvent {
      op: OpType::Update,
      document_id: id.clone(),
      full_document: Some(updated.clone()),
      collection,
      position: None,
    };
    commit(&mut inner, event);
    Ok(Some(updated))
  }

  /// Replace a whole document. Returns `false` if it does not exist.
  pub fn replace(&self, collection: impl Into<CollectionName>, doc: Document) -> Result<bool> {
    let collection = collection.into();
    let doc = into_object(doc)?;
    let id = DocumentId::of(&doc)
      .ok_or_else(|| RivuletError::Validation("replacement document needs an _id".into()))?;

    let mut inner = self.lock();
    let Some(slot) = inner
      .collections
      .get_mut(&collection)
      .and_then(|docs| docs.get_mut(&key(&id)))
    else {
      return Ok(false);
    };
    *slot = doc.clone();
    let event = ChangeEvent {
      op: OpType::Replace,
      document_id: id,
      full_document: Some(doc),
      collection,
      position: None,
    };
    commit(&mut inner, event);
    Ok(true)
  }

  /// Delete a document. Returns `false` if it did not exist.
  pub fn delete(&self, collection: impl Into<CollectionName>, id: &DocumentId) -> bool {
    let collection = collection.into();
    let mut inner = self.lock();
    let removed = inner
      .collections
      .get_mut(&collection)
      .and_then(|docs| docs.remove(&key(id)))
      .is_some();
    if removed {
      commit(&mut inner, ChangeEvent::delete(collection, id.clone()));
    }
    removed
  }

  pub fn get(&self, collection: &CollectionName, id: &DocumentId) -> Option<Document> {
    self
      .lock()
      .collections
      .get(collection)
      .and_then(|docs| docs.get(&key(id)).cloned())
  }

  /// Documents in `collection` matching `filter`, ordered by id.
  pub fn find(&self, collection: &CollectionName, filter: &FilterExpr) -> Vec<Document> {
    self
      .lock()
      .collections
      .get(collection)
      .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
      .unwrap_or_default()
  }

  /// Position of the last committed write.
  pub fn position(&self) -> FeedPosition {
    FeedPosition(self.lock().position)
  }

  pub fn count(&self, collection: &CollectionName) -> usize {
    self
      .lock()
      .collections
      .get(collection)
      .map_or(0, BTreeMap::len)
  }

  // ── Fault injection ────────────────────────────────────────

  /// Invalidate every open stream.
  pub fn invalidate(&self) {
    publish(&mut self.lock(), RawChange::Invalidate);
  }

  /// Emit an administrative event on every open stream.
  pub fn emit_admin(&self, kind: AdminKind, collection: Option<CollectionName>) {
    publish(&mut self.lock(), RawChange::Admin { kind, collection });
  }

  /// Make every open stream yield an error.
  pub fn fail_streams(&self, message: &str) {
    let mut inner = self.lock();
    for stream in inner.streams.drain(..) {
      let _ = stream.tx.send(Err(RivuletError::feed(message.to_string())));
    }
    debug!(message, "injected change stream failure");
  }

  /// Make the next `n` stream opens fail.
  pub fn fail_next_opens(&self, n: u32) {
    self.faults.failing_opens.store(n, Ordering::SeqCst);
  }

  /// Make closing a stream report an error.
  pub fn set_fail_close(&self, fail: bool) {
    self.faults.fail_close.store(fail, Ordering::SeqCst);
  }

  /// Number of `open` calls so far, including failed ones.
  pub fn open_count(&self) -> usize {
    self.faults.opens.load(Ordering::SeqCst)
  }

  /// Number of streams currently receiving events.
  pub fn open_streams(&self) -> usize {
    self.lock().streams.len()
  }
}

/// Stamp a write with the next feed position and publish it.
fn commit(inner: &mut Inner, event: ChangeEvent) {
  inner.position += 1;
  let event = event.at(FeedPosition(inner.position));
  publish(inner, RawChange::Data(event));
}

/// Deliver a change to every live stream, pruning streams whose receiver
/// is gone.
fn publish(inner: &mut Inner, change: RawChange) {
  inner.streams.retain(|stream| {
    if let RawChange::Data(event) = &change {
      if !stream.ops.contains(&event.op) {
        return !stream.tx.is_closed();
      }
    }
    stream.tx.send(Ok(change.clone())).is_ok()
  });
}

fn into_object(doc: Document) -> Result<Document> {
  match doc {
    Value::Object(_) => Ok(doc),
    Value::Null => Ok(Value::Object(Map::new())),
    other => Err(RivuletError::Validation(format!(
      "documents must be objects, got {}",
      other
    ))),
  }
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn query(
    &self,
    entity: &EntityDescriptor,
    filter: &FilterExpr,
  ) -> Result<Versioned<Vec<Document>>> {
    let inner = self.lock();
    let docs = inner
      .collections
      .get(&entity.collection)
      .map(|docs| docs.values().filter(|d| filter.matches(d)).cloned().collect())
      .unwrap_or_default();
    Ok(Versioned::at(docs, FeedPosition(inner.position)))
  }

  async fn find_by_id(
    &self,
    entity: &EntityDescriptor,
    id: &DocumentId,
  ) -> Result<Versioned<Option<Document>>> {
    let inner = self.lock();
    let doc = inner
      .collections
      .get(&entity.collection)
      .and_then(|docs| docs.get(&key(id)).cloned());
    Ok(Versioned::at(doc, FeedPosition(inner.position)))
  }
}
