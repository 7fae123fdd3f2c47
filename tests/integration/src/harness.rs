#![cfg(test)]
use async_trait::async_trait;
use rivulet_core::catalog::{EntityCatalog, EntityDescriptor};
use rivulet_core::filter::FilterExpr;
use rivulet_core::store::{DocumentStore, Versioned};
use rivulet_core::{RealtimeBuilder, RealtimeService};
use rivulet_http::egress::{ChannelTransport, Frame, SessionStream};
use rivulet_memory::MemoryStore;
use shared::config::FeedConfig;
use shared::error::{Result, RivuletError};
use shared::event::{Document, DocumentId, FeedPosition};
use shared::session::SessionId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub const WAIT: Duration = Duration::from_secs(5);

/// `users` with a `Moderator` subtype tagged `Mod`, and `posts`.
pub fn catalog() -> Arc<EntityCatalog> {
  let catalog = EntityCatalog::new("__t");
  catalog.register_root("User", "users").unwrap();
  catalog.register_subtype("Moderator", "User", "Mod").unwrap();
  catalog.register_root("Post", "posts").unwrap();
  Arc::new(catalog)
}

/// Reconnect quickly so feed tests do not sit in backoff.
pub fn fast_feed() -> FeedConfig {
  FeedConfig {
    backoff_base_ms: 10,
    backoff_cap_ms: 50,
    ..FeedConfig::default()
  }
}

/// A document store whose queries can be made to fail.
pub struct FlakyStore {
  inner: MemoryStore,
  failing: AtomicBool,
}

impl FlakyStore {
  pub fn new(inner: MemoryStore) -> Self {
    Self {
      inner,
      failing: AtomicBool::new(false),
    }
  }

  pub fn set_failing(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  fn check(&self, entity: &EntityDescriptor) -> Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(RivuletError::StoreFailed {
        collection: entity.collection.to_string(),
        source: "connection reset".into(),
      });
    }
    Ok(())
  }
}

#[async_trait]
impl DocumentStore for FlakyStore {
  async fn query(
    &self,
    entity: &EntityDescriptor,
    filter: &FilterExpr,
  ) -> Result<Versioned<Vec<Document>>> {
    self.check(entity)?;
    self.inner.query(entity, filter).await
  }

  async fn find_by_id(
    &self,
    entity: &EntityDescriptor,
    id: &DocumentId,
  ) -> Result<Versioned<Option<Document>>> {
    self.check(entity)?;
    self.inner.find_by_id(entity, id).await
  }
}

pub struct Harness {
  pub store: Arc<MemoryStore>,
  pub flaky: Arc<FlakyStore>,
  pub transport: Arc<ChannelTransport>,
  pub service: RealtimeService,
}

impl Harness {
  /// Start with default rules and wait for the change stream to open.
  pub async fn start() -> Self {
    Self::start_with(fast_feed(), |b| b).await
  }

  pub async fn start_with(
    feed: FeedConfig,
    configure: impl FnOnce(RealtimeBuilder) -> RealtimeBuilder,
  ) -> Self {
    let harness = Self::spawn(MemoryStore::new(), feed, configure);
    harness.wait_streaming(1).await;
    harness
  }

  /// Start without waiting for the feed, for stores primed with faults.
  pub fn spawn(
    store: MemoryStore,
    feed: FeedConfig,
    configure: impl FnOnce(RealtimeBuilder) -> RealtimeBuilder,
  ) -> Self {
    let store = Arc::new(store);
    let flaky = Arc::new(FlakyStore::new(store.as_ref().clone()));
    let transport = Arc::new(ChannelTransport::new());
    let service = configure(RealtimeBuilder::new(catalog(), feed))
      .start(flaky.clone(), store.clone(), transport.clone())
      .unwrap();
    Self {
      store,
      flaky,
      transport,
      service,
    }
  }

  /// Wait until `opens` successful or failed opens happened and a stream
  /// is receiving events.
  pub async fn wait_streaming(&self, opens: usize) {
    let store = Arc::clone(&self.store);
    wait_until(move || store.open_count() >= opens && store.open_streams() == 1).await;
  }

  pub fn open(&self, session: &str) -> SessionStream {
    self.transport.open(SessionId::from(session))
  }

  /// Wait until every write committed so far has been fanned out.
  ///
  /// Frames for those writes are queued on the session streams once this
  /// returns, so a test can assert what did not arrive.
  pub async fn settle(&self) {
    let committed = self.store.position();
    if committed == FeedPosition(0) {
      return;
    }
    let mut applied = self.service.subscribe_applied_position();
    timeout(WAIT, applied.wait_for(|p| p.is_some_and(|p| p >= committed)))
      .await
      .expect("feed did not settle in time")
      .expect("dispatcher stopped");
  }
}

pub async fn wait_until(mut cond: impl FnMut() -> bool) {
  timeout(WAIT, async {
    while !cond() {
      sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("condition not reached in time");
}

pub async fn next_frame(stream: &mut SessionStream) -> Frame {
  timeout(WAIT, stream.recv())
    .await
    .expect("no frame in time")
    .expect("session stream closed")
}

/// Id carried by an add / update / remove frame.
pub fn frame_id(frame: &Frame) -> &serde_json::Value {
  &frame.payload["_id"]
}
