use serde_json::{json, Value};

use super::types::{Document, DocumentId};
use crate::error::RivuletError;

/// Initial snapshot delivered with a `data` push.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
  /// Query mode: every document matching the effective filter.
  Many(Vec<Document>),
  /// Document mode: the watched document, or `None` when it does not exist.
  One(Option<Document>),
}

impl Snapshot {
  /// Documents carried by the snapshot, in order.
  pub fn documents(&self) -> &[Document] {
    match self {
      Snapshot::Many(docs) => docs,
      Snapshot::One(Some(doc)) => std::slice::from_ref(doc),
      Snapshot::One(None) => &[],
    }
  }
}

/// An event pushed to a client session.
///
/// Payload shapes are part of the client protocol and must not change.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
  Data(Snapshot),
  Add { id: DocumentId, data: Document },
  Update { id: DocumentId, data: Document },
  Remove { id: DocumentId },
  Exception {
    message: String,
    error: String,
    status_code: u16,
  },
}

impl PushEvent {
  /// Wire event name.
  pub fn name(&self) -> &'static str {
    match self {
      PushEvent::Data(_) => "data",
      PushEvent::Add { .. } => "add",
      PushEvent::Update { .. } => "update",
      PushEvent::Remove { .. } => "remove",
      PushEvent::Exception { .. } => "exception",
    }
  }

  /// Wire payload.
  pub fn payload(&self) -> Value {
    match self {
      PushEvent::Data(Snapshot::Many(docs)) => Value::Array(docs.clone()),
      PushEvent::Data(Snapshot::One(doc)) => doc.clone().unwrap_or(Value::Null),
      PushEvent::Add { id, data } | PushEvent::Update { id, data } => {
        json!({ "_id": id.as_value(), "data": data })
      }
      PushEvent::Remove { id } => json!({ "_id": id.as_value() }),
      PushEvent::Exception {
        message,
        error,
        status_code,
      } => json!({
        "message": message,
        "error": error,
        "statusCode": status_code,
      }),
    }
  }

  pub fn exception(err: &RivuletError) -> Self {
    let kind = err.kind();
    PushEvent::Exception {
      message: err.to_string(),
      error: kind.as_str().to_string(),
      status_code: kind.status_code(),
    }
  }
}
