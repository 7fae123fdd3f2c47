use shared::error::Result;
use shared::event::{PushEvent, Snapshot};
use shared::session::{SessionId, UserContext};
use std::sync::Arc;
use tracing::{info, warn};

use super::guard::GuardSet;
use super::handshake::{HandshakeRequest, Target};
use crate::catalog::{EntityCatalog, EntityDescriptor};
use crate::dispatch::Dispatcher;
use crate::metrics::MetricsRegistry;
use crate::registry::SubscriptionRegistry;
use crate::rules::RuleEvaluator;

/// Binds subscriptions to transport connections.
///
/// A handshake is fully validated (guards, entity, discriminator, read
/// rule) before any subscription exists; a rejected handshake leaves no
/// state behind.
pub struct SessionManager {
  catalog: Arc<EntityCatalog>,
  evaluator: Arc<RuleEvaluator>,
  registry: Arc<SubscriptionRegistry>,
  dispatcher: Arc<Dispatcher>,
  guards: GuardSet,
  metrics: Arc<MetricsRegistry>,
}

impl SessionManager {
  pub fn new(
    catalog: Arc<EntityCatalog>,
    evaluator: Arc<RuleEvaluator>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<Dispatcher>,
    guards: GuardSet,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    Self {
      catalog,
      evaluator,
      registry,
      dispatcher,
      guards,
      metrics,
    }
  }

  /// Validate a handshake and register an uninitialized subscription.
  pub async fn connect(
    &self,
    session: SessionId,
    request: &HandshakeRequest,
  ) -> Result<Arc<EntityDescriptor>> {
    let result = async {
      self.guards.check(request).await?;
      let entity = self
        .catalog
        .resolve(&request.collection, request.discriminator.as_deref())?;
      self.register(session.clone(), entity, &request.user).await
    }
    .await;
    self.observe_handshake(&session, result)
  }

  /// Register a subscription for an entity type named directly.
  pub async fn connect_entity(
    &self,
    session: SessionId,
    entity: &str,
    user: &UserContext,
  ) -> Result<Arc<EntityDescriptor>> {
    let result = async {
      let entity = self.catalog.get(entity)?;
      let mut request = HandshakeRequest::new(entity.collection.clone(), user.clone());
      if let Some(d) = entity.discriminator.as_ref().filter(|d| !d.is_root) {
        request = request.with_discriminator(d.value.clone());
      }
      self.guards.check(&request).await?;
      self.register(session.clone(), entity, user).await
    }
    .await;
    self.observe_handshake(&session, result)
  }

  async fn register(
    &self,
    session: SessionId,
    entity: Arc<EntityDescriptor>,
    user: &UserContext,
  ) -> Result<Arc<EntityDescriptor>> {
    let mut scope = self.evaluator.read_scope(&entity, user).await?;
    if let Some(constraint) = entity.constraint() {
      scope = scope.and(constraint);
    }
    self.registry.create(session, Arc::clone(&entity), scope)?;
    Ok(entity)
  }

  fn observe_handshake(
    &self,
    session: &SessionId,
    result: Result<Arc<EntityDescriptor>>,
  ) -> Result<Arc<EntityDescriptor>> {
    match &result {
      Ok(entity) => {
        self.metrics.active_sessions.set(self.registry.len() as i64);
        info!(session = %session, entity = %entity.name, "session connected");
      }
      Err(e) => {
        self
          .metrics
          .handshakes_rejected
          .with_label_values(&[e.kind().as_str()])
          .inc();
        warn!(session = %session, error = %e, "handshake rejected");
      }
    }
    result
  }

  /// Point a session at a query or a document and push the initial `data`.
  ///
  /// The `data` push and any changes that landed during the read are
  /// emitted before later events for the session. Failures are pushed to the client as `exception` and also returned;
  /// the subscription keeps its previous target.
  pub async fn set_target(&self, session: &SessionId, target: Target) -> Result<Snapshot> {
    let result = match target {
      Target::Query(filter) => {
        self
          .registry
          .set_query(session, filter, self.dispatcher.as_ref())
          .await
      }
      Target::Document(id) => {
        self
          .registry
          .set_document(session, id, self.dispatcher.as_ref())
          .await
      }
    };
    match result {
      Ok(snapshot) => Ok(snapshot),
      Err(e) => {
        warn!(session = %session, error = %e, "subscription target rejected");
        self.dispatcher.emit(session, PushEvent::exception(&e));
        Err(e)
      }
    }
  }

  /// Drop a session's subscription. Unknown sessions are ignored.
  pub fn disconnect(&self, session: &SessionId) -> bool {
    let removed = self.registry.remove(session);
    if removed {
      self.metrics.active_sessions.set(self.registry.len() as i64);
      info!(session = %session, "session disconnected");
    }
    removed
  }

  pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
    &self.registry
  }

  /// Whether `session` has a subscription that has not been closed.
  pub fn is_connected(&self, session: &SessionId) -> bool {
    self.registry.get(session).is_some()
  }
}

