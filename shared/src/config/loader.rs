use serde::Deserialize;

use crate::error::{Result, RivuletError};
use crate::event::OpType;

/// Root configuration for the Rivulet daemon.
///
/// Loaded from TOML files via the `config` crate with environment-variable
/// overrides (prefix: `RIVULET_`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RivuletConfig {
  /// Change feed connection settings.
  #[serde(default)]
  pub feed: FeedConfig,
  /// Entity types served to clients.
  #[serde(default)]
  pub catalog: CatalogConfig,
  /// Observability settings.
  #[serde(default)]
  pub observability: ObservabilityConfig,
  /// Tokio runtime settings.
  #[serde(default)]
  pub runtime: RuntimeSettings,
}

/// Change feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Operation types requested from the change stream.
  #[serde(default = "default_ops")]
  pub operation_types: Vec<String>,
  /// Base reconnect delay in milliseconds.
  #[serde(default = "default_backoff_base_ms")]
  pub backoff_base_ms: u64,
  /// Upper bound on the reconnect delay in milliseconds.
  #[serde(default = "default_backoff_cap_ms")]
  pub backoff_cap_ms: u64,
  /// Capacity of the connector → dispatcher channel.
  #[serde(default = "default_channel_capacity")]
  pub channel_capacity: usize,
  /// Re-seed every subscription and push a fresh snapshot after the feed
  /// reconnects.
  #[serde(default = "default_true")]
  pub resync_on_reconnect: bool,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      operation_types: default_ops(),
      backoff_base_ms: default_backoff_base_ms(),
      backoff_cap_ms: default_backoff_cap_ms(),
      channel_capacity: default_channel_capacity(),
      resync_on_reconnect: true,
    }
  }
}

impl FeedConfig {
  /// Parse `operation_types` into typed tags.
  pub fn op_types(&self) -> Result<Vec<OpType>> {
    self
      .operation_types
      .iter()
      .map(|s| {
        OpType::from_str_tag(s).ok_or_else(|| RivuletError::ConfigInvalid {
          key: "feed.operation_types".into(),
          reason: format!("unsupported operation type '{}'", s),
        })
      })
      .collect()
  }
}

/// Entity catalog configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
  /// Field that stores the subtype tag in shared collections.
  #[serde(default = "default_discriminator_key")]
  pub discriminator_key: String,
  /// Registered entity types.
  #[serde(default)]
  pub entities: Vec<EntityConfig>,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      discriminator_key: default_discriminator_key(),
      entities: Vec::new(),
    }
  }
}

/// A single entity type.
///
/// Root entities name their `collection`; subtypes name their `base` and
/// inherit its collection.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
  /// Entity type name, e.g. `User`.
  pub name: String,
  /// Backing collection (root entities only).
  pub collection: Option<String>,
  /// Base entity type (subtypes only).
  pub base: Option<String>,
  /// Discriminator value; defaults to the entity name for subtypes.
  pub discriminator: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
  /// Log level filter (e.g. `info`, `debug`, `trace`).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Prometheus metrics listen address.
  #[serde(default = "default_metrics_addr")]
  pub metrics_addr: String,
}

impl Default for ObservabilityConfig {
  fn default() -> Self {
    Self {
      log_level: default_log_level(),
      metrics_addr: default_metrics_addr(),
    }
  }
}

/// Tokio runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeSettings {
  /// Worker threads; `None` uses the number of CPU cores.
  pub worker_threads: Option<usize>,
}

impl RivuletConfig {
  /// Check cross-field constraints that serde cannot express.
  pub fn validate(&self) -> Result<()> {
    if self.feed.backoff_base_ms == 0 {
      return Err(RivuletError::ConfigInvalid {
        key: "feed.backoff_base_ms".into(),
        reason: "must be greater than zero".into(),
      });
    }
    if self.feed.backoff_cap_ms < self.feed.backoff_base_ms {
      return Err(RivuletError::ConfigInvalid {
        key: "feed.backoff_cap_ms".into(),
        reason: "must not be smaller than backoff_base_ms".into(),
      });
    }
    if self.feed.channel_capacity == 0 {
      return Err(RivuletError::ConfigInvalid {
        key: "feed.channel_capacity".into(),
        reason: "must be greater than zero".into(),
      });
    }
    self.feed.op_types()?;
    Ok(())
  }
}

// ── Default value functions ─────────────────────────────────────────

fn default_ops() -> Vec<String> {
  OpType::ALL.iter().map(|op| op.as_str().to_string()).collect()
}
fn default_backoff_base_ms() -> u64 {
  1_000
}
fn default_backoff_cap_ms() -> u64 {
  30_000
}
fn default_channel_capacity() -> usize {
  1024
}
fn default_true() -> bool {
  true
}
fn default_discriminator_key() -> String {
  "__t".to_string()
}
fn default_log_level() -> String {
  "info".to_string()
}
fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}
