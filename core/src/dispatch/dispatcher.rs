use shared::event::{ChangeEvent, FeedPosition, PushEvent, Snapshot};
use shared::session::SessionId;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::listener::ChangeListener;
use super::transition::transition;
use crate::feed::FeedMessage;
use crate::metrics::MetricsRegistry;
use crate::registry::{lock, SeedSink, Subscription, SubscriptionRegistry};
use crate::transport::Transport;

/// Fans classified change events out to subscriptions.
///
/// One event is applied to every subscriber before the next is read, so
/// each session observes feed order and no two events race on the same
/// matched set. Pushes for a session are emitted while its subscription is
/// locked, which keeps them ordered against a concurrent seed. Emission is
/// fire-and-forget.
pub struct Dispatcher {
  registry: Arc<SubscriptionRegistry>,
  transport: Arc<dyn Transport>,
  listeners: Vec<Arc<dyn ChangeListener>>,
  metrics: Arc<MetricsRegistry>,
  resync_on_reconnect: bool,
  /// Position of the last positioned event fully dispatched.
  applied: watch::Sender<Option<FeedPosition>>,
}

impl Dispatcher {
  pub fn new(
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn Transport>,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    Self {
      registry,
      transport,
      listeners: Vec::new(),
      metrics,
      resync_on_reconnect: true,
      applied: watch::channel(None).0,
    }
  }

  pub fn with_listeners(mut self, listeners: Vec<Arc<dyn ChangeListener>>) -> Self {
    self.listeners = listeners;
    self
  }

  pub fn with_resync(mut self, enabled: bool) -> Self {
    self.resync_on_reconnect = enabled;
    self
  }

  /// Watch the feed position up to which every event has been dispatched.
  pub fn subscribe_applied(&self) -> watch::Receiver<Option<FeedPosition>> {
    self.applied.subscribe()
  }

  /// Apply one event to every subscription on its collection.
  ///
  /// Returns the number of pushes emitted.
  pub fn dispatch(&self, event: &ChangeEvent) -> usize {
    let timer = self.metrics.dispatch_latency.start_timer();
    self
      .metrics
      .events_dispatched
      .with_label_values(&[event.op.as_str(), event.collection.as_str()])
      .inc();

    for listener in &self.listeners {
      listener.on_change(event);
    }

    let mut emitted = 0;
    for sub in self.registry.subscribers(&event.collection) {
      let mut guard = lock(&sub);
      if let Some(push) = transition(&mut guard, event) {
        let session = guard.session().clone();
        if self.emit(&session, push) {
          emitted += 1;
        }
      }
    }

    if let Some(position) = event.position {
      self.applied.send_replace(Some(position));
    }
    debug!(
      op = %event.op,
      collection = %event.collection,
      document = %event.document_id,
      position = ?event.position,
      emitted,
      "dispatched change event"
    );
    timer.observe_duration();
    emitted
  }

  /// Re-seed every active subscription and push a fresh `data` snapshot.
  pub async fn resync(&self) -> usize {
    let mut refreshed = 0;
    for session in self.registry.session_ids() {
      match self.registry.resync(&session, self).await {
        Ok(Some(_)) => {
          self.metrics.resyncs.inc();
          refreshed += 1;
        }
        Ok(None) => {}
        Err(e) => {
          warn!(session = %session, error = %e, "failed to resync subscription");
          self.emit(&session, PushEvent::exception(&e));
        }
      }
    }
    info!(sessions = refreshed, "resynchronized subscriptions after reconnect");
    refreshed
  }

  /// Consume feed messages until the connector side of the channel closes.
  pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<FeedMessage>) {
    info!("dispatcher started");
    while let Some(msg) = rx.recv().await {
      match msg {
        FeedMessage::Change(event) => {
          self.dispatch(&event);
        }
        FeedMessage::Resumed if self.resync_on_reconnect => {
          self.resync().await;
        }
        FeedMessage::Resumed => {
          debug!("feed resumed, resync disabled");
        }
      }
    }
    info!("dispatcher stopped");
  }

  /// Send a push, swallowing delivery failures.
  pub fn emit(&self, session: &SessionId, push: PushEvent) -> bool {
    let name = push.name();
    match self.transport.emit(session, push) {
      Ok(()) => {
        self.metrics.pushes_emitted.with_label_values(&[name]).inc();
        true
      }
      Err(e) => {
        self.metrics.pushes_dropped.inc();
        debug!(session = %session, push = name, error = %e, "dropped push for gone session");
        false
      }
    }
  }
}

impl SeedSink for Dispatcher {
  /// Push the snapshot, then replay the held events against the new target.
  fn deliver(&self, sub: &mut Subscription, snapshot: Option<&Snapshot>, backlog: Vec<ChangeEvent>) {
    let session = sub.session().clone();
    if let Some(snapshot) = snapshot {
      self.emit(&session, PushEvent::Data(snapshot.clone()));
    }
    let held = backlog.len();
    let mut replayed = 0;
    for event in &backlog {
      if let Some(push) = transition(sub, event) {
        self.emit(&session, push);
        replayed += 1;
      }
    }
    if held > 0 {
      debug!(session = %session, held, replayed, "replayed events held during seeding");
    }
  }
}
