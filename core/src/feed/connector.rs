use shared::error::RivuletError;
use shared::event::OpType;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::classify::{classify, Classified};
use super::source::{ChangeFeedSource, ChangeStream};
use super::FeedMessage;
use crate::metrics::MetricsRegistry;

/// Observable connector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
  Connecting,
  Streaming,
  /// Waiting before the next open after `failures` consecutive failures.
  Backoff { failures: u32, delay: Duration },
  Stopped,
}

/// Why the connector stopped reading from a stream.
enum StreamExit {
  Shutdown,
  ReceiverGone,
  /// `forwarded` is set when the stream delivered at least one data event.
  Invalidated { forwarded: bool },
  Failed(RivuletError),
}

/// Keeps one change stream open for the life of the process.
///
/// Data events are forwarded in order over a bounded channel. Invalidation
/// reopens the stream immediately, unless the previous stream was also
/// invalidated without forwarding anything, in which case the reopen backs
/// off. Errors (including the stream simply ending) reopen it after an
/// exponential backoff. There is no retry limit.
pub struct FeedConnector {
  source: Arc<dyn ChangeFeedSource>,
  ops: Vec<OpType>,
  backoff: Backoff,
  tx: mpsc::Sender<FeedMessage>,
  metrics: Arc<MetricsRegistry>,
  state: watch::Sender<ConnectorState>,
}

/// Control handle for a running connector task.
pub struct ConnectorHandle {
  cancel: CancellationToken,
  join: JoinHandle<()>,
  state: watch::Receiver<ConnectorState>,
}

impl FeedConnector {
  pub fn new(
    source: Arc<dyn ChangeFeedSource>,
    ops: Vec<OpType>,
    backoff: Backoff,
    tx: mpsc::Sender<FeedMessage>,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    let (state, _) = watch::channel(ConnectorState::Connecting);
    Self {
      source,
      ops,
      backoff,
      tx,
      metrics,
      state,
    }
  }

  /// Start the connector on the current runtime.
  pub fn spawn(self) -> ConnectorHandle {
    let cancel = CancellationToken::new();
    let state = self.state.subscribe();
    let join = tokio::spawn(self.run(cancel.clone()));
    ConnectorHandle {
      cancel,
      join,
      state,
    }
  }

  async fn run(self, cancel: CancellationToken) {
    let mut failures: u32 = 0;
    let mut invalidations: u32 = 0;
    let mut connected_before = false;

    loop {
      self.set_state(ConnectorState::Connecting);
      let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        opened = self.source.open(&self.ops) => opened,
      };

      let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
          failures = failures.saturating_add(1);
          error!(error = %e, failures, "failed to open change stream");
          if !self.wait(failures, &cancel).await {
            break;
          }
          continue;
        }
      };

      failures = 0;
      if connected_before {
        info!("change stream resumed");
        if self.tx.send(FeedMessage::Resumed).await.is_err() {
          close_stream(stream.as_mut()).await;
          break;
        }
      } else {
        info!(ops = ?self.ops, "change stream opened");
      }
      connected_before = true;
      self.set_state(ConnectorState::Streaming);

      match self.pump(stream.as_mut(), &cancel).await {
        StreamExit::Shutdown | StreamExit::ReceiverGone => {
          info!("Closing change stream…");
          close_stream(stream.as_mut()).await;
          break;
        }
        StreamExit::Invalidated { forwarded } => {
          self.metrics.feed_reconnects.with_label_values(&["invalidate"]).inc();
          close_stream(stream.as_mut()).await;
          invalidations = if forwarded { 1 } else { invalidations.saturating_add(1) };
          if invalidations == 1 {
            warn!("change stream invalidated, reconnecting");
          } else {
            warn!(invalidations, "change stream invalidated again before any data");
            if !self.wait(invalidations - 1, &cancel).await {
              break;
            }
          }
        }
        StreamExit::Failed(e) => {
          invalidations = 0;
          failures = failures.saturating_add(1);
          error!(error = %e, failures, "change stream failed");
          self.metrics.feed_reconnects.with_label_values(&["error"]).inc();
          close_stream(stream.as_mut()).await;
          if !self.wait(failures, &cancel).await {
            break;
          }
        }
      }
    }

    self.set_state(ConnectorState::Stopped);
    info!("feed connector stopped");
  }

  async fn pump(&self, stream: &mut dyn ChangeStream, cancel: &CancellationToken) -> StreamExit {
    let mut forwarded = false;
    loop {
      let item = tokio::select! {
        biased;
        _ = cancel.cancelled() => return StreamExit::Shutdown,
        item = stream.next() => item,
      };

      let raw = match item {
        Some(Ok(raw)) => raw,
        Some(Err(e)) => return StreamExit::Failed(e),
        None => return StreamExit::Failed(RivuletError::feed("change stream ended")),
      };

      match classify(raw, &self.ops) {
        Classified::Forward(event) => {
          debug!(
            op = %event.op,
            collection = %event.collection,
            document = %event.document_id,
            "forwarding change event"
          );
          self.metrics.events_forwarded.inc();
          let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamExit::Shutdown,
            sent = self.tx.send(FeedMessage::Change(event)) => sent,
          };
          if sent.is_err() {
            return StreamExit::ReceiverGone;
          }
          forwarded = true;
        }
        Classified::Reconnect => return StreamExit::Invalidated { forwarded },
        Classified::SkipAdmin(kind) => {
          debug!(kind = kind.as_str(), "skipping administrative change event");
          self
            .metrics
            .admin_events_skipped
            .with_label_values(&[kind.as_str()])
            .inc();
        }
        Classified::SkipOp(op) => {
          debug!(op = %op, "skipping unsubscribed operation type");
        }
      }
    }
  }

  /// Sleep out the backoff delay. Returns `false` if shutdown interrupted it.
  async fn wait(&self, failures: u32, cancel: &CancellationToken) -> bool {
    let delay = self.backoff.delay_for(failures);
    self.set_state(ConnectorState::Backoff { failures, delay });
    warn!(
      failures,
      delay_ms = delay.as_millis() as u64,
      "reconnecting change stream after backoff"
    );
    tokio::select! {
      biased;
      _ = cancel.cancelled() => false,
      _ = tokio::time::sleep(delay) => true,
    }
  }

  fn set_state(&self, state: ConnectorState) {
    self.state.send_replace(state);
  }
}

async fn close_stream(stream: &mut dyn ChangeStream) {
  if let Err(e) = stream.close().await {
    error!(error = %e, "failed to close change stream");
  }
}

impl ConnectorHandle {
  pub fn state(&self) -> ConnectorState {
    *self.state.borrow()
  }

  /// Watch state changes.
  pub fn subscribe_state(&self) -> watch::Receiver<ConnectorState> {
    self.state.clone()
  }

  /// Close the feed and wait for the connector task to finish.
  ///
  /// Close errors are logged by the task; this always completes.
  pub async fn shutdown(self) {
    self.cancel.cancel();
    if let Err(e) = self.join.await {
      error!(error = %e, "feed connector task aborted");
    }
  }
}
