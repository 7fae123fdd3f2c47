use dashmap::DashMap;
use rivulet_core::transport::Transport;
use shared::error::{Result, RivuletError};
use shared::event::PushEvent;
use shared::session::SessionId;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::stream::{Frame, SessionStream};

/// [`Transport`] that queues frames on per-session unbounded channels.
///
/// `emit` never blocks; a session whose receiver is gone is forgotten on
/// the next write.
#[derive(Default)]
pub struct ChannelTransport {
  sessions: DashMap<SessionId, mpsc::UnboundedSender<Frame>>,
}

impl ChannelTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a socket and return its outbound stream. Reopening an id
  /// replaces the previous socket.
  pub fn open(&self, session: SessionId) -> SessionStream {
    let (tx, rx) = mpsc::unbounded_channel();
    if self.sessions.insert(session.clone(), tx).is_some() {
      warn!(session = %session, "socket reopened, previous stream detached");
    }
    debug!(session = %session, "socket opened");
    SessionStream::new(session, rx)
  }

  /// Forget a socket. Its stream yields `None` once drained.
  pub fn close(&self, session: &SessionId) -> bool {
    let closed = self.sessions.remove(session).is_some();
    if closed {
      debug!(session = %session, "socket closed");
    }
    closed
  }

  pub fn len(&self) -> usize {
    self.sessions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.is_empty()
  }
}

impl Transport for ChannelTransport {
  fn emit(&self, session: &SessionId, event: PushEvent) -> Result<()> {
    let frame = Frame::from_push(&event);
    let sent = match self.sessions.get(session) {
      Some(tx) => tx.send(frame).is_ok(),
      None => return Err(RivuletError::SessionDisconnected(session.to_string())),
    };
    if !sent {
      self.sessions.remove(session);
      return Err(RivuletError::SessionDisconnected(session.to_string()));
    }
    Ok(())
  }

  fn is_connected(&self, session: &SessionId) -> bool {
    self
      .sessions
      .get(session)
      .map_or(false, |tx| !tx.is_closed())
  }
}
