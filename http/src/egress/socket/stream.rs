use serde_json::{json, Value};
use shared::event::PushEvent;
use shared::session::SessionId;
use tokio::sync::mpsc;

/// One message on the wire: an event name plus its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  pub event: &'static str,
  pub payload: Value,
}

impl Frame {
  pub fn from_push(push: &PushEvent) -> Self {
    Self {
      event: push.name(),
      payload: push.payload(),
    }
  }

  /// Envelope form, `{"event": ..., "data": ...}`.
  pub fn to_json(&self) -> Value {
    json!({ "event": self.event, "data": self.payload })
  }
}

/// Receiving end of a session's outbound queue, owned by the socket writer.
pub struct SessionStream {
  session: SessionId,
  rx: mpsc::UnboundedReceiver<Frame>,
  frames_received: u64,
}

impl SessionStream {
  pub(crate) fn new(session: SessionId, rx: mpsc::UnboundedReceiver<Frame>) -> Self {
    Self {
      session,
      rx,
      frames_received: 0,
    }
  }

  /// Next frame, or `None` once the session was closed.
  pub async fn recv(&mut self) -> Option<Frame> {
    let frame = self.rx.recv().await;
    if frame.is_some() {
      self.frames_received += 1;
    }
    frame
  }

  /// Next frame if one is already queued.
  pub fn try_recv(&mut self) -> Option<Frame> {
    let frame = self.rx.try_recv().ok();
    if frame.is_some() {
      self.frames_received += 1;
    }
    frame
  }

  /// Every frame queued right now.
  pub fn drain(&mut self) -> Vec<Frame> {
    std::iter::from_fn(|| self.try_recv()).collect()
  }

  pub fn session(&self) -> &SessionId {
    &self.session
  }

  pub fn frames_received(&self) -> u64 {
    self.frames_received
  }
}
