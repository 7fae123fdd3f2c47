use serde::Deserialize;
use serde_json::Value;
use shared::error::{Result, RivuletError};
use shared::event::{CollectionName, DocumentId};
use shared::session::UserContext;

use crate::filter::{parse_filter, FilterExpr};

/// Connection parameters sent by a client when it opens a session.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
  pub collection: CollectionName,
  /// Subtype tag for entities sharing a base collection.
  pub discriminator: Option<String>,
  pub user: UserContext,
}

#[derive(Deserialize)]
struct HandshakeQuery {
  collection: Option<String>,
  discriminator: Option<String>,
}

impl HandshakeRequest {
  pub fn new(collection: impl Into<CollectionName>, user: UserContext) -> Self {
    Self {
      collection: collection.into(),
      discriminator: None,
      user,
    }
  }

  pub fn with_discriminator(mut self, discriminator: impl Into<String>) -> Self {
    self.discriminator = Some(discriminator.into());
    self
  }

  /// Parse the `{collection, discriminator?}` handshake query.
  pub fn from_json(query: &Value, user: UserContext) -> Result<Self> {
    let parsed: HandshakeQuery = serde_json::from_value(query.clone())
      .map_err(|e| RivuletError::Validation(format!("malformed handshake: {}", e)))?;
    let collection = parsed
      .collection
      .filter(|c| !c.is_empty())
      .ok_or_else(|| RivuletError::Validation("handshake is missing 'collection'".into()))?;
    Ok(Self {
      collection: collection.into(),
      discriminator: parsed.discriminator.filter(|d| !d.is_empty()),
      user,
    })
  }
}

/// What a subscription watches once the handshake succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
  Query(FilterExpr),
  Document(DocumentId),
}

impl Target {
  /// Parse `{"filter": {...}}` or `{"documentId": ...}`.
  pub fn from_json(value: &Value) -> Result<Self> {
    if let Some(filter) = value.get("filter") {
      return Ok(Target::Query(parse_filter(filter)?));
    }
    match value.get("documentId") {
      Some(Value::Null) | None => Err(RivuletError::Validation(
        "subscription target needs 'filter' or 'documentId'".into(),
      )),
      Some(id) => Ok(Target::Document(DocumentId::new(id.clone()))),
    }
  }
}
