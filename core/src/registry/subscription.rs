use shared::event::{ChangeEvent, Document, DocumentId, FeedPosition};
use shared::session::SessionId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::catalog::EntityDescriptor;
use crate::filter::FilterExpr;

/// Lifecycle of a subscription. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
  /// Created by the handshake, no target yet.
  Uninitialized,
  /// Watching a query or a document.
  Active,
  /// Removed on disconnect. Terminal.
  Closed,
}

/// What an active subscription watches.
#[derive(Debug, Clone)]
pub enum Watch {
  /// Query mode: the effective filter and the ids believed to match it.
  Query {
    filter: FilterExpr,
    matched: HashSet<DocumentId>,
  },
  /// Document mode: a single document id, and whether the client
  /// currently holds a visible copy of it.
  Document { id: DocumentId, visible: bool },
}

/// Identifies one seed read. Only the latest ticket may activate.
pub(crate) type SeedTicket = u64;

/// Per-session live view.
#[derive(Debug)]
pub struct Subscription {
  session: SessionId,
  entity: Arc<EntityDescriptor>,
  /// Read predicate AND discriminator constraint, frozen at handshake.
  scope: FilterExpr,
  state: SubscriptionState,
  watch: Option<Watch>,
  /// Feed position the current watch was seeded at.
  seeded_at: Option<FeedPosition>,
  seed_ticket: SeedTicket,
  /// Events that arrived while a seed read was in flight.
  backlog: Option<Vec<ChangeEvent>>,
}

/// A subscription shared between the registry and the dispatcher.
pub type SharedSubscription = Arc<Mutex<Subscription>>;

/// Lock a subscription, recovering the data if a holder panicked.
pub fn lock(sub: &SharedSubscription) -> MutexGuard<'_, Subscription> {
  sub.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Subscription {
  pub fn new(session: SessionId, entity: Arc<EntityDescriptor>, scope: FilterExpr) -> Self {
    Self {
      session,
      entity,
      scope,
      state: SubscriptionState::Uninitialized,
      watch: None,
      seeded_at: None,
      seed_ticket: 0,
      backlog: None,
    }
  }

  pub fn session(&self) -> &SessionId {
    &self.session
  }

  pub fn entity(&self) -> &Arc<EntityDescriptor> {
    &self.entity
  }

  pub fn scope(&self) -> &FilterExpr {
    &self.scope
  }

  pub fn state(&self) -> SubscriptionState {
    self.state
  }

  pub fn is_active(&self) -> bool {
    self.state == SubscriptionState::Active
  }

  /// A seed read is in flight and events are being held back.
  pub fn is_seeding(&self) -> bool {
    self.backlog.is_some()
  }

  pub fn seeded_at(&self) -> Option<FeedPosition> {
    self.seeded_at
  }

  pub fn watch(&self) -> Option<&Watch> {
    self.watch.as_ref()
  }

  pub(crate) fn watch_mut(&mut self) -> Option<&mut Watch> {
    self.watch.as_mut()
  }

  /// The filter a changed document is tested against (query mode only).
  pub fn effective_filter(&self) -> Option<&FilterExpr> {
    match &self.watch {
      Some(Watch::Query { filter, .. }) => Some(filter),
      _ => None,
    }
  }

  pub fn matched(&self) -> Option<&HashSet<DocumentId>> {
    match &self.watch {
      Some(Watch::Query { matched, .. }) => Some(matched),
      _ => None,
    }
  }

  /// Start holding events back for a seed read.
  ///
  /// A newer seed supersedes an older one still in flight; the held
  /// events carry over to whichever seed finishes last.
  pub(crate) fn begin_seed(&mut self) -> SeedTicket {
    self.seed_ticket += 1;
    self.backlog.get_or_insert_with(Vec::new);
    self.seed_ticket
  }

  /// Hand back the held events if `ticket` is the latest seed.
  ///
  /// Returns `None` when a newer seed is still in flight.
  pub(crate) fn finish_seed(&mut self, ticket: SeedTicket) -> Option<Vec<ChangeEvent>> {
    if ticket != self.seed_ticket {
      return None;
    }
    self.backlog.take()
  }

  /// Hold `event` back if a seed read is in flight.
  pub(crate) fn hold(&mut self, event: &ChangeEvent) -> bool {
    match &mut self.backlog {
      Some(backlog) => {
        backlog.push(event.clone());
        true
      }
      None => false,
    }
  }

  /// The seed read already reflects `event`.
  pub(crate) fn is_stale(&self, event: &ChangeEvent) -> bool {
    matches!((event.position, self.seeded_at), (Some(at), Some(seeded)) if at <= seeded)
  }

  /// Point the subscription at a query and its seeded matches.
  pub(crate) fn activate_query(
    &mut self,
    filter: FilterExpr,
    docs: &[Document],
    as_of: Option<FeedPosition>,
  ) {
    let matched = docs.iter().filter_map(DocumentId::of).collect();
    self.watch = Some(Watch::Query { filter, matched });
    self.seeded_at = as_of;
    self.state = SubscriptionState::Active;
  }

  pub(crate) fn activate_document(
    &mut self,
    id: DocumentId,
    visible: bool,
    as_of: Option<FeedPosition>,
  ) {
    self.watch = Some(Watch::Document { id, visible });
    self.seeded_at = as_of;
    self.state = SubscriptionState::Active;
  }

  pub(crate) fn close(&mut self) {
    self.watch = None;
    self.backlog = None;
    self.state = SubscriptionState::Closed;
  }
}
