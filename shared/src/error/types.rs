use std::fmt;
use thiserror::Error;

/// Boxed source error carried by I/O-facing variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for the live-query engine.
///
/// Variants are grouped by the five kinds clients can observe (see
/// [`ErrorKind`]). Collaborator failures are attached as `#[source]` so that
/// log output keeps the full cause chain.
#[derive(Debug, Error)]
pub enum RivuletError {
  // ── Validation ─────────────────────────────────────────────
  #[error("validation: {0}")]
  Validation(String),

  #[error("validation: invalid filter: {0}")]
  InvalidFilter(String),

  #[error("validation: session '{0}' already exists")]
  SessionExists(String),

  // ── Access ─────────────────────────────────────────────────
  #[error("access: {operation} denied on '{entity}'")]
  AccessDenied { entity: String, operation: String },

  #[error("access: forbidden document values for {operation} on '{entity}'")]
  ForbiddenDocument { entity: String, operation: String },

  #[error("access: connection rejected by guard")]
  GuardRejected,

  // ── Lookup ─────────────────────────────────────────────────
  #[error("not found: unknown collection '{0}'")]
  UnknownCollection(String),

  #[error("not found: unknown entity type '{0}'")]
  UnknownEntity(String),

  #[error("not found: discriminator '{discriminator}' is not defined on '{entity}'")]
  UnknownDiscriminator {
    entity: String,
    discriminator: String,
  },

  #[error("not found: session '{0}'")]
  SessionNotFound(String),

  // ── Transport ──────────────────────────────────────────────
  #[error("feed: failed to open change stream")]
  FeedOpenFailed(#[source] BoxError),

  #[error("feed: change stream failed")]
  FeedStreamFailed(#[source] BoxError),

  #[error("feed: failed to close change stream")]
  FeedCloseFailed(#[source] BoxError),

  #[error("transport: session '{0}' is disconnected")]
  SessionDisconnected(String),

  #[error("store: query against collection '{collection}' failed")]
  StoreFailed {
    collection: String,
    #[source]
    source: BoxError,
  },

  // ── Config ─────────────────────────────────────────────────
  #[error("config: invalid value for '{key}': {reason}")]
  ConfigInvalid { key: String, reason: String },

  // ── Generic ────────────────────────────────────────────────
  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

/// The client-visible classification of a [`RivuletError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Validation,
  AccessDenied,
  NotFound,
  Transport,
  Internal,
}

impl ErrorKind {
  /// Name used in `exception` payloads.
  pub fn as_str(&self) -> &'static str {
    match self {
      ErrorKind::Validation => "ValidationError",
      ErrorKind::AccessDenied => "AccessDenied",
      ErrorKind::NotFound => "NotFound",
      ErrorKind::Transport => "TransportError",
      ErrorKind::Internal => "InternalError",
    }
  }

  /// HTTP-style status code reported alongside the error name.
  pub fn status_code(&self) -> u16 {
    match self {
      ErrorKind::Validation => 400,
      ErrorKind::AccessDenied => 403,
      ErrorKind::NotFound => 404,
      ErrorKind::Transport => 503,
      ErrorKind::Internal => 500,
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl RivuletError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      RivuletError::Validation(_)
      | RivuletError::InvalidFilter(_)
      | RivuletError::SessionExists(_)
      | RivuletError::ConfigInvalid { .. } => ErrorKind::Validation,

      RivuletError::AccessDenied { .. }
      | RivuletError::ForbiddenDocument { .. }
      | RivuletError::GuardRejected => ErrorKind::AccessDenied,

      RivuletError::UnknownCollection(_)
      | RivuletError::UnknownEntity(_)
      | RivuletError::UnknownDiscriminator { .. }
      | RivuletError::SessionNotFound(_) => ErrorKind::NotFound,

      RivuletError::FeedOpenFailed(_)
      | RivuletError::FeedStreamFailed(_)
      | RivuletError::FeedCloseFailed(_)
      | RivuletError::SessionDisconnected(_)
      | RivuletError::StoreFailed { .. } => ErrorKind::Transport,

      RivuletError::Internal(_) => ErrorKind::Internal,
    }
  }

  pub fn status_code(&self) -> u16 {
    self.kind().status_code()
  }

  /// Build a feed error from any displayable message.
  pub fn feed(msg: impl Into<String>) -> Self {
    RivuletError::FeedStreamFailed(msg.into().into())
  }
}
