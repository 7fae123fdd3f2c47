use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use shared::error::{Result, RivuletError};
use shared::event::{ChangeEvent, CollectionName, DocumentId, FeedPosition, Snapshot};
use shared::session::SessionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::subscription::{lock, SharedSubscription, Subscription, SubscriptionState, Watch};
use crate::catalog::EntityDescriptor;
use crate::filter::FilterExpr;
use crate::store::DocumentStore;

/// Receives the outcome of a seed read while the subscription is locked.
///
/// `snapshot` is `None` when the read failed and the previous target was
/// kept. `backlog` holds the events that arrived during the read, in feed
/// order; they have not been applied yet.
pub trait SeedSink: Send + Sync {
  fn deliver(&self, sub: &mut Subscription, snapshot: Option<&Snapshot>, backlog: Vec<ChangeEvent>);
}

/// What a seed read targets.
enum Seed {
  /// An effective filter, scope already folded in.
  Query(FilterExpr),
  Document(DocumentId),
}

/// Owns every live subscription.
///
/// Sessions are keyed by id and additionally indexed by the collection they
/// watch, so fan-out for one event only visits that collection's sessions.
/// Both maps are sharded; add and remove never block iteration of a
/// subscriber snapshot taken by the dispatcher. Where both maps are locked
/// at once, the session shard is taken first.
pub struct SubscriptionRegistry {
  store: Arc<dyn DocumentStore>,
  sessions: DashMap<SessionId, SharedSubscription>,
  by_collection: DashMap<CollectionName, HashMap<SessionId, SharedSubscription>>,
}

impl SubscriptionRegistry {
  pub fn new(store: Arc<dyn DocumentStore>) -> Self {
    Self {
      store,
      sessions: DashMap::new(),
      by_collection: DashMap::new(),
    }
  }

  /// Register a new, uninitialized subscription.
  pub fn create(
    &self,
    session: SessionId,
    entity: Arc<EntityDescriptor>,
    scope: FilterExpr,
  ) -> Result<SharedSubscription> {
    let collection = entity.collection.clone();
    let sub = Arc::new(Mutex::new(Subscription::new(session.clone(), entity, scope)));

    match self.sessions.entry(session.clone()) {
      Entry::Occupied(_) => return Err(RivuletError::SessionExists(session.to_string())),
      Entry::Vacant(slot) => {
        // Indexed while the slot is held so a remove of the same id cannot
        // run between the two inserts.
        self
          .by_collection
          .entry(collection.clone())
          .or_default()
          .insert(session.clone(), Arc::clone(&sub));
        slot.insert(Arc::clone(&sub));
      }
    }

    debug!(session = %session, collection = %collection, "subscription created");
    Ok(sub)
  }

  /// Watch a query: seed the matched set from the store and return the
  /// initial snapshot.
  ///
  /// The snapshot and any events held during the read go to `sink` before
  /// the subscription is unlocked.
  pub async fn set_query(
    &self,
    session: &SessionId,
    filter: FilterExpr,
    sink: &dyn SeedSink,
  ) -> Result<Snapshot> {
    let sub = self.open(session)?;
    let effective = lock(&sub).scope().clone().and(filter);
    let (snapshot, _) = self.seed(session, &sub, Seed::Query(effective), sink).await?;
    Ok(snapshot)
  }

  /// Watch a single document and return it (or `None`).
  ///
  /// A document outside the read scope is reported as absent.
  pub async fn set_document(
    &self,
    session: &SessionId,
    id: DocumentId,
    sink: &dyn SeedSink,
  ) -> Result<Snapshot> {
    let sub = self.open(session)?;
    let (snapshot, _) = self.seed(session, &sub, Seed::Document(id), sink).await?;
    Ok(snapshot)
  }

  /// Discard a session's subscription. Returns `false` if it was unknown.
  pub fn remove(&self, session: &SessionId) -> bool {
    let Some((_, sub)) = self.sessions.remove(session) else {
      return false;
    };

    let collection = {
      let mut guard = lock(&sub);
      guard.close();
      guard.entity().collection.clone()
    };
    self.unindex(&collection, session, &sub);

    debug!(session = %session, collection = %collection, "subscription removed");
    true
  }

  /// Re-run an active subscription's seed query or lookup, replacing its
  /// matched set.
  ///
  /// Returns `None` when the session is not active, is already seeding, or
  /// was retargeted while the read ran.
  pub async fn resync(&self, session: &SessionId, sink: &dyn SeedSink) -> Result<Option<Snapshot>> {
    let Some(sub) = self.get(session) else {
      return Ok(None);
    };
    let target = {
      let guard = lock(&sub);
      if !guard.is_active() || guard.is_seeding() {
        return Ok(None);
      }
      match guard.watch() {
        Some(Watch::Query { filter, .. }) => Seed::Query(filter.clone()),
        Some(Watch::Document { id, .. }) => Seed::Document(id.clone()),
        None => return Ok(None),
      }
    };

    match self.seed(session, &sub, target, sink).await {
      Ok((snapshot, true)) => Ok(Some(snapshot)),
      Ok((_, false)) => Ok(None),
      Err(RivuletError::SessionNotFound(_)) => Ok(None),
      Err(e) => Err(e),
    }
  }

  pub fn get(&self, session: &SessionId) -> Option<SharedSubscription> {
    self.sessions.get(session).map(|s| Arc::clone(s.value()))
  }

  /// Snapshot of the subscriptions watching `collection`.
  pub fn subscribers(&self, collection: &CollectionName) -> Vec<SharedSubscription> {
    self
      .by_collection
      .get(collection)
      .map(|sessions| sessions.values().cloned().collect())
      .unwrap_or_default()
  }

  /// Ids of every registered session.
  pub fn session_ids(&self) -> Vec<SessionId> {
    self.sessions.iter().map(|e| e.key().clone()).collect()
  }

  pub fn count(&self, collection: &CollectionName) -> usize {
    self.by_collection.get(collection).map_or(0, |s| s.len())
  }

  pub fn len(&self) -> usize {
    self.sessions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.is_empty()
  }

  /// Remove every session, e.g. on shutdown.
  pub fn clear(&self) {
    let ids = self.session_ids();
    for id in &ids {
      self.remove(id);
    }
    if !ids.is_empty() {
      info!(sessions = ids.len(), "cleared all subscriptions");
    }
  }

  /// A registered subscription that has not been closed.
  fn open(&self, session: &SessionId) -> Result<SharedSubscription> {
    self
      .get(session)
      .filter(|s| lock(s).state() != SubscriptionState::Closed)
      .ok_or_else(|| RivuletError::SessionNotFound(session.to_string()))
  }

  /// Drop `sub` from the collection index, unless the slot already holds a
  /// newer subscription for the same session id.
  fn unindex(&self, collection: &CollectionName, session: &SessionId, sub: &SharedSubscription) {
    if let Some(mut sessions) = self.by_collection.get_mut(collection) {
      if sessions.get(session).is_some_and(|s| Arc::ptr_eq(s, sub)) {
        sessions.remove(session);
      }
    }
    self
      .by_collection
      .remove_if(collection, |_, sessions| sessions.is_empty());
  }

  /// Read a target from the store and activate it.
  ///
  /// Events for the subscription are held from before the read until the
  /// result is delivered, so the client sees the snapshot first and then
  /// exactly the changes the snapshot does not reflect. The flag is `false`
  /// when a newer seed superseded this one.
  async fn seed(
    &self,
    session: &SessionId,
    sub: &SharedSubscription,
    target: Seed,
    sink: &dyn SeedSink,
  ) -> Result<(Snapshot, bool)> {
    let (entity, scope, ticket) = {
      let mut guard = lock(sub);
      (Arc::clone(guard.entity()), guard.scope().clone(), guard.begin_seed())
    };

    let read: Result<(Snapshot, Option<FeedPosition>)> = match &target {
      Seed::Query(filter) => self
        .store
        .query(&entity, filter)
        .await
        .map(|r| (Snapshot::Many(r.value), r.as_of)),
      Seed::Document(id) => self
        .store
        .find_by_id(&entity, id)
        .await
        .map(|r| (Snapshot::One(r.value.filter(|d| scope.matches(d))), r.as_of)),
    };

    let mut guard = lock(sub);
    if guard.state() == SubscriptionState::Closed {
      return Err(RivuletError::SessionNotFound(session.to_string()));
    }
    let (snapshot, as_of) = match read {
      Ok(read) => read,
      Err(e) => {
        if let Some(backlog) = guard.finish_seed(ticket) {
          sink.deliver(&mut guard, None, backlog);
        }
        return Err(e);
      }
    };
    let Some(backlog) = guard.finish_seed(ticket) else {
      debug!(session = %session, "seed superseded by a newer target");
      return Ok((snapshot, false));
    };

    let held = backlog.len();
    match target {
      Seed::Query(filter) => guard.activate_query(filter, snapshot.documents(), as_of),
      Seed::Document(id) => {
        let visible = !snapshot.documents().is_empty();
        guard.activate_document(id, visible, as_of);
      }
    }
    sink.deliver(&mut guard, Some(&snapshot), backlog);
    debug!(
      session = %session,
      documents = snapshot.documents().len(),
      held,
      as_of = ?as_of,
      "subscription seeded"
    );
    Ok((snapshot, true))
  }
}
