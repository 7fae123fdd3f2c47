use tokio::signal;
use tracing::{error, info};

/// Manages the process lifecycle: startup → running → graceful shutdown.
pub struct Lifecycle {
  state: LifecycleState,
}

/// Current lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  /// Loading config, building the catalog, opening the change stream.
  Initializing,
  /// Serving sessions.
  Running,
  /// Closing the feed and draining the dispatcher.
  ShuttingDown,
  /// Stopped.
  Stopped,
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self::new()
  }
}

impl Lifecycle {
  pub fn new() -> Self {
    Self {
      state: LifecycleState::Initializing,
    }
  }

  /// Transition to the next state. Backward transitions are ignored.
  pub fn transition(&mut self, new_state: LifecycleState) -> bool {
    if rank(new_state) <= rank(self.state) {
      return false;
    }
    info!(
      from = ?self.state,
      to = ?new_state,
      "lifecycle state transition"
    );
    self.state = new_state;
    true
  }

  /// Current state.
  pub fn state(&self) -> LifecycleState {
    self.state
  }

  /// Wait for a shutdown signal (SIGINT or SIGTERM).
  pub async fn wait_for_shutdown() {
    let ctrl_c = async {
      if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
      }
    };

    #[cfg(unix)]
    let terminate = async {
      match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sig) => {
          sig.recv().await;
        }
        Err(e) => {
          error!(error = %e, "failed to install SIGTERM handler");
          std::future::pending::<()>().await;
        }
      }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
      _ = ctrl_c => info!("received SIGINT"),
      _ = terminate => info!("received SIGTERM"),
    }
  }
}

fn rank(state: LifecycleState) -> u8 {
  match state {
    LifecycleState::Initializing => 0,
    LifecycleState::Running => 1,
    LifecycleState::ShuttingDown => 2,
    LifecycleState::Stopped => 3,
  }
}
