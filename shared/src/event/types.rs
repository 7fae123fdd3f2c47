use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A document as stored in a collection. Always a JSON object carrying `_id`.
pub type Document = Value;

/// Field holding a document's primary identifier.
pub const ID_FIELD: &str = "_id";

/// The mutation category that produced a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
  Insert,
  Update,
  Replace,
  Delete,
}

impl OpType {
  /// All data-mutation operations the feed subscribes to by default.
  pub const ALL: [OpType; 4] = [
    OpType::Insert,
    OpType::Update,
    OpType::Replace,
    OpType::Delete,
  ];

  /// Returns the change-stream tag (`operationType`).
  pub fn as_str(&self) -> &'static str {
    match self {
      OpType::Insert => "insert",
      OpType::Update => "update",
      OpType::Replace => "replace",
      OpType::Delete => "delete",
    }
  }

  /// Parse from a string tag.
  pub fn from_str_tag(s: &str) -> Option<Self> {
    match s {
      "insert" | "INSERT" => Some(OpType::Insert),
      "update" | "UPDATE" => Some(OpType::Update),
      "replace" | "REPLACE" => Some(OpType::Replace),
      "delete" | "DELETE" => Some(OpType::Delete),
      _ => None,
    }
  }

  /// Past-tense verb used in application event names.
  pub fn event_verb(&self) -> &'static str {
    match self {
      OpType::Insert => "created",
      OpType::Update | OpType::Replace => "updated",
      OpType::Delete => "deleted",
    }
  }
}

impl fmt::Display for OpType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Primary identifier of a document.
///
/// Ids compare as JSON values, so `"1"` and `1` are distinct ids, and so are
/// the numbers `1` and `1.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Value);

impl DocumentId {
  pub fn new(id: impl Into<Value>) -> Self {
    Self(id.into())
  }

  /// Extract the `_id` of a document, if present and non-null.
  pub fn of(doc: &Document) -> Option<Self> {
    match doc.get(ID_FIELD) {
      None | Some(Value::Null) => None,
      Some(v) => Some(Self(v.clone())),
    }
  }

  pub fn as_value(&self) -> &Value {
    &self.0
  }
}

impl fmt::Display for DocumentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.0 {
      Value::String(s) => f.write_str(s),
      other => write!(f, "{}", other),
    }
  }
}

impl From<&str> for DocumentId {
  fn from(s: &str) -> Self {
    Self(Value::String(s.to_string()))
  }
}

impl From<String> for DocumentId {
  fn from(s: String) -> Self {
    Self(Value::String(s))
  }
}

/// Position of a write in the change feed's total order.
///
/// Store reads report the position they reflect, which lets a freshly seeded
/// subscription skip feed events its snapshot already contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedPosition(pub u64);

impl fmt::Display for FeedPosition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Identifies a collection in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(pub String);

impl CollectionName {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CollectionName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for CollectionName {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl From<String> for CollectionName {
  fn from(s: String) -> Self {
    Self(s)
  }
}
