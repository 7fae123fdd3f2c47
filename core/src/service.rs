use shared::config::FeedConfig;
use shared::error::Result;
use shared::event::{Document, FeedPosition, Snapshot};
use shared::session::{SessionId, UserContext};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::catalog::{EntityCatalog, EntityDescriptor};
use crate::dispatch::{ChangeListener, Dispatcher};
use crate::feed::{Backoff, ChangeFeedSource, ConnectorHandle, ConnectorState, FeedConnector};
use crate::filter::FilterExpr;
use crate::metrics::MetricsRegistry;
use crate::registry::SubscriptionRegistry;
use crate::rules::{AccessRule, Operation, RuleEvaluator, RuleRegistry};
use crate::session::{ConnectionGuard, GuardSet, HandshakeRequest, SessionManager, Target};
use crate::store::DocumentStore;
use crate::transport::Transport;

/// Collects rules, guards and listeners before the engine starts.
pub struct RealtimeBuilder {
  feed: FeedConfig,
  catalog: Arc<EntityCatalog>,
  rules: Arc<RuleRegistry>,
  guards: GuardSet,
  listeners: Vec<Arc<dyn ChangeListener>>,
  metrics: Option<Arc<MetricsRegistry>>,
}

impl RealtimeBuilder {
  pub fn new(catalog: Arc<EntityCatalog>, feed: FeedConfig) -> Self {
    Self {
      feed,
      catalog,
      rules: Arc::new(RuleRegistry::new()),
      guards: GuardSet::default(),
      listeners: Vec::new(),
      metrics: None,
    }
  }

  pub fn register_rule(self, entity: impl Into<String>, rule: Arc<dyn AccessRule>) -> Self {
    self.rules.register(entity, rule);
    self
  }

  pub fn register_guard(mut self, guard: Arc<dyn ConnectionGuard>) -> Self {
    self.guards.push(guard);
    self
  }

  pub fn register_change_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
    self.listeners.push(listener);
    self
  }

  pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Wire the engine together and start the connector and dispatcher
  /// tasks. Must be called from within a Tokio runtime.
  pub fn start(
    self,
    store: Arc<dyn DocumentStore>,
    source: Arc<dyn ChangeFeedSource>,
    transport: Arc<dyn Transport>,
  ) -> Result<RealtimeService> {
    let ops = self.feed.op_types()?;
    let metrics = match self.metrics {
      Some(m) => m,
      None => Arc::new(MetricsRegistry::new()?),
    };

    let registry = Arc::new(SubscriptionRegistry::new(store));
    let evaluator = Arc::new(RuleEvaluator::new(
      Arc::clone(&self.catalog),
      self.rules.clone(),
    ));
    let dispatcher = Arc::new(
      Dispatcher::new(Arc::clone(&registry), transport, Arc::clone(&metrics))
        .with_listeners(self.listeners)
        .with_resync(self.feed.resync_on_reconnect),
    );

    let applied = dispatcher.subscribe_applied();
    let (tx, rx) = mpsc::channel(self.feed.channel_capacity);
    let dispatch_task = tokio::spawn(Arc::clone(&dispatcher).run(rx));
    let connector = FeedConnector::new(
      source,
      ops,
      Backoff::from_millis(self.feed.backoff_base_ms, self.feed.backoff_cap_ms),
      tx,
      Arc::clone(&metrics),
    )
    .spawn();

    let sessions = SessionManager::new(
      Arc::clone(&self.catalog),
      Arc::clone(&evaluator),
      Arc::clone(&registry),
      dispatcher,
      self.guards,
      Arc::clone(&metrics),
    );

    info!(
      entities = self.catalog.len(),
      rules = self.rules.len(),
      resync = self.feed.resync_on_reconnect,
      "live query engine started"
    );

    Ok(RealtimeService {
      catalog: self.catalog,
      evaluator,
      registry,
      sessions,
      metrics,
      connector,
      dispatch_task,
      applied,
    })
  }
}

/// The running live-query engine.
pub struct RealtimeService {
  catalog: Arc<EntityCatalog>,
  evaluator: Arc<RuleEvaluator>,
  registry: Arc<SubscriptionRegistry>,
  sessions: SessionManager,
  metrics: Arc<MetricsRegistry>,
  connector: ConnectorHandle,
  dispatch_task: JoinHandle<()>,
  applied: watch::Receiver<Option<FeedPosition>>,
}

impl RealtimeService {
  /// Validate a transport handshake and register the session.
  pub async fn connect(
    &self,
    session: SessionId,
    request: &HandshakeRequest,
  ) -> Result<Arc<EntityDescriptor>> {
    self.sessions.connect(session, request).await
  }

  /// Set or replace what a connected session watches.
  pub async fn set_target(&self, session: &SessionId, target: Target) -> Result<Snapshot> {
    self.sessions.set_target(session, target).await
  }

  /// Handshake and target in one step. Nothing is left registered if
  /// either fails.
  pub async fn subscribe(
    &self,
    session: SessionId,
    entity: &str,
    target: Target,
    user: &UserContext,
  ) -> Result<Snapshot> {
    self.sessions.connect_entity(session.clone(), entity, user).await?;
    match self.sessions.set_target(&session, target).await {
      Ok(snapshot) => Ok(snapshot),
      Err(e) => {
        self.sessions.disconnect(&session);
        Err(e)
      }
    }
  }

  pub fn unsubscribe(&self, session: &SessionId) -> bool {
    self.sessions.disconnect(session)
  }

  /// Check a document against the create/update rule of `entity`.
  pub async fn authorize_document(
    &self,
    entity: &str,
    user: &UserContext,
    op: Operation,
    doc: &Document,
  ) -> Result<()> {
    self.evaluator.authorize_document(entity, user, op, doc).await
  }

  /// Restrict a read/delete filter by the rule of `entity`.
  pub async fn scope_filter(
    &self,
    entity: &str,
    user: &UserContext,
    op: Operation,
    filter: FilterExpr,
  ) -> Result<FilterExpr> {
    self.evaluator.scope_filter(entity, user, op, filter).await
  }

  pub fn catalog(&self) -> &Arc<EntityCatalog> {
    &self.catalog
  }

  pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
    &self.registry
  }

  pub fn metrics(&self) -> &Arc<MetricsRegistry> {
    &self.metrics
  }

  pub fn connector_state(&self) -> ConnectorState {
    self.connector.state()
  }

  pub fn subscribe_connector_state(&self) -> watch::Receiver<ConnectorState> {
    self.connector.subscribe_state()
  }

  /// Feed position up to which every change has been fanned out.
  pub fn applied_position(&self) -> Option<FeedPosition> {
    *self.applied.borrow()
  }

  pub fn subscribe_applied_position(&self) -> watch::Receiver<Option<FeedPosition>> {
    self.applied.clone()
  }

  /// Close the feed, drain the dispatcher and drop every subscription.
  ///
  /// Returns once the change stream is closed, even if closing failed.
  pub async fn shutdown(self) {
    info!("shutting down live query engine");
    self.connector.shutdown().await;
    if let Err(e) = self.dispatch_task.await {
      error!(error = %e, "dispatcher task aborted");
    }
    self.registry.clear();
    self.metrics.active_sessions.set(0);
    info!(applied = ?*self.applied.borrow(), "live query engine stopped");
  }
}
