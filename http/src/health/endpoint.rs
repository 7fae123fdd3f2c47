use rivulet_core::feed::ConnectorState;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Health check endpoint.
///
/// Reports readiness and liveness for Kubernetes-style health checks.
/// The daemon is "ready" once the engine has started; the feed flag
/// follows the change stream connector.
pub struct HealthEndpoint {
  ready: Arc<AtomicBool>,
  live: Arc<AtomicBool>,
  feed: Arc<AtomicBool>,
}

impl Default for HealthEndpoint {
  fn default() -> Self {
    Self::new()
  }
}

impl HealthEndpoint {
  pub fn new() -> Self {
    Self {
      ready: Arc::new(AtomicBool::new(false)),
      live: Arc::new(AtomicBool::new(true)),
      feed: Arc::new(AtomicBool::new(false)),
    }
  }

  /// Mark the daemon as ready.
  pub fn set_ready(&self) {
    self.ready.store(true, Ordering::Release);
    info!("health: daemon is ready");
  }

  /// Mark the daemon as not ready (e.g. during drain).
  pub fn set_not_ready(&self) {
    self.ready.store(false, Ordering::Release);
  }

  /// Mark the daemon as not live (fatal error, or stopped).
  pub fn set_not_live(&self) {
    self.live.store(false, Ordering::Release);
  }

  pub fn set_feed_streaming(&self, streaming: bool) {
    self.feed.store(streaming, Ordering::Release);
  }

  /// Returns `true` if the daemon is ready to serve traffic.
  pub fn is_ready(&self) -> bool {
    self.ready.load(Ordering::Acquire)
  }

  /// Returns `true` if the daemon is alive and should not be restarted.
  pub fn is_live(&self) -> bool {
    self.live.load(Ordering::Acquire)
  }

  pub fn is_feed_streaming(&self) -> bool {
    self.feed.load(Ordering::Acquire)
  }

  /// Follow connector state changes until the connector goes away.
  pub fn track_feed(&self, mut state: watch::Receiver<ConnectorState>) -> JoinHandle<()> {
    let health = self.clone();
    tokio::spawn(async move {
      loop {
        let current = *state.borrow_and_update();
        let streaming = current == ConnectorState::Streaming;
        if health.is_feed_streaming() && !streaming {
          warn!(state = ?current, "health: change feed interrupted");
        }
        health.set_feed_streaming(streaming);
        if state.changed().await.is_err() {
          health.set_feed_streaming(false);
          break;
        }
      }
    })
  }

  /// Health check response as JSON.
  pub fn status_json(&self) -> String {
    json!({
      "ready": self.is_ready(),
      "live": self.is_live(),
      "feed": self.is_feed_streaming(),
    })
    .to_string()
  }
}

impl Clone for HealthEndpoint {
  fn clone(&self) -> Self {
    Self {
      ready: Arc::clone(&self.ready),
      live: Arc::clone(&self.live),
      feed: Arc::clone(&self.feed),
    }
  }
}
