use async_trait::async_trait;
use shared::error::Result;
use shared::event::{OpType, RawChange};

/// An open change stream.
#[async_trait]
pub trait ChangeStream: Send {
  /// The next item, or `None` once the stream has ended.
  async fn next(&mut self) -> Option<Result<RawChange>>;

  /// Release the underlying cursor.
  async fn close(&mut self) -> Result<()>;
}

/// Opens change streams on the document store.
#[async_trait]
pub trait ChangeFeedSource: Send + Sync {
  /// Subscribe to changes restricted to `ops`.
  async fn open(&self, ops: &[OpType]) -> Result<Box<dyn ChangeStream>>;
}
