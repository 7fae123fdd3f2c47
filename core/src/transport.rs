use shared::error::Result;
use shared::event::PushEvent;
use shared::session::SessionId;

/// Outbound side of client connections.
///
/// `emit` must not block: the dispatcher calls it from the fan-out loop.
pub trait Transport: Send + Sync {
  /// Queue `event` for delivery to `session`.
  fn emit(&self, session: &SessionId, event: PushEvent) -> Result<()>;

  fn is_connected(&self, session: &SessionId) -> bool;
}
