use async_trait::async_trait;
use shared::error::{Result, RivuletError};
use std::sync::Arc;
use tracing::debug;

use super::handshake::HandshakeRequest;

/// Decides whether a client may open a session at all.
#[async_trait]
pub trait ConnectionGuard: Send + Sync {
  async fn can_connect(&self, request: &HandshakeRequest) -> Result<bool>;
}

/// Runs the registered guards. With no guards every connection is let
/// through; otherwise at least one guard must allow.
#[derive(Default, Clone)]
pub struct GuardSet {
  guards: Vec<Arc<dyn ConnectionGuard>>,
}

impl GuardSet {
  pub fn new(guards: Vec<Arc<dyn ConnectionGuard>>) -> Self {
    Self { guards }
  }

  pub fn push(&mut self, guard: Arc<dyn ConnectionGuard>) {
    self.guards.push(guard);
  }

  pub fn len(&self) -> usize {
    self.guards.len()
  }

  pub fn is_empty(&self) -> bool {
    self.guards.is_empty()
  }

  pub async fn check(&self, request: &HandshakeRequest) -> Result<()> {
    if self.guards.is_empty() {
      return Ok(());
    }
    for guard in &self.guards {
      if guard.can_connect(request).await? {
        return Ok(());
      }
    }
    debug!(collection = %request.collection, "all connection guards rejected handshake");
    Err(RivuletError::GuardRejected)
  }
}
