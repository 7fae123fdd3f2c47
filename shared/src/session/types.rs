use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Uniquely identifies a client session (one transport connection).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<String> for SessionId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for SessionId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// Opaque identity of the caller, as extracted by the transport glue.
///
/// Rules and guards inspect it; the engine itself never does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserContext(pub Value);

impl UserContext {
  pub fn new(value: Value) -> Self {
    Self(value)
  }

  /// An unauthenticated caller.
  pub fn anonymous() -> Self {
    Self(Value::Null)
  }

  /// Look up a top-level claim, e.g. `user.get("id")`.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn as_value(&self) -> &Value {
    &self.0
  }
}

impl From<Value> for UserContext {
  fn from(v: Value) -> Self {
    Self(v)
  }
}
