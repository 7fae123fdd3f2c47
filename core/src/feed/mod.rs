//! Feed connector: a durable, self-healing subscription to the document
//! store's change stream.

pub mod backoff;
pub mod classify;
pub mod connector;
pub mod source;

use shared::event::ChangeEvent;

pub use backoff::Backoff;
pub use classify::{classify, Classified};
pub use connector::{ConnectorHandle, ConnectorState, FeedConnector};
pub use source::{ChangeFeedSource, ChangeStream};

/// Items sent from the connector to the dispatcher, in feed order.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
  Change(ChangeEvent),
  /// The stream was reopened after an interruption; events may have been
  /// missed in between.
  Resumed,
}
