use async_trait::async_trait;
use rivulet_core::feed::{ChangeFeedSource, ChangeStream};
use shared::error::{Result, RivuletError};
use shared::event::{OpType, RawChange};
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tracing::debug;

use crate::store::MemoryStore;

/// Publishing side of one open stream, held by the store.
pub(crate) struct StreamSender {
  pub(crate) id: u64,
  pub(crate) ops: Vec<OpType>,
  pub(crate) tx: mpsc::UnboundedSender<Result<RawChange>>,
}

/// A change stream over a [`MemoryStore`].
pub struct MemoryChangeStream {
  id: u64,
  rx: mpsc::UnboundedReceiver<Result<RawChange>>,
  store: MemoryStore,
}

#[async_trait]
impl ChangeStream for MemoryChangeStream {
  async fn next(&mut self) -> Option<Result<RawChange>> {
    self.rx.recv().await
  }

  async fn close(&mut self) -> Result<()> {
    self.store.lock().streams.retain(|s| s.id != self.id);
    self.rx.close();
    debug!(stream = self.id, "memory change stream closed");
    if self.store.faults.fail_close.load(Ordering::SeqCst) {
      return Err(RivuletError::FeedCloseFailed(
        format!("stream {} refused to close", self.id).into(),
      ));
    }
    Ok(())
  }
}

#[async_trait]
impl ChangeFeedSource for MemoryStore {
  async fn open(&self, ops: &[OpType]) -> Result<Box<dyn ChangeStream>> {
    self.faults.opens.fetch_add(1, Ordering::SeqCst);
    let refused = self
      .faults
      .failing_opens
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if refused {
      return Err(RivuletError::FeedOpenFailed("memory store refused the stream".into()));
    }

    let id = self.faults.next_stream.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::unbounded_channel();
    self.lock().streams.push(StreamSender {
      id,
      ops: ops.to_vec(),
      tx,
    });
    debug!(stream = id, ops = ?ops, "memory change stream opened");

    Ok(Box::new(MemoryChangeStream {
      id,
      rx,
      store: self.clone(),
    }))
  }
}
