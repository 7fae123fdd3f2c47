pub mod loader;

pub use loader::{
  CatalogConfig, EntityConfig, FeedConfig, ObservabilityConfig, RivuletConfig, RuntimeSettings,
};

use std::path::Path;

/// Load configuration from a TOML file with environment-variable overrides.
///
/// Resolution order:
/// 1. `config/default.toml`: base configuration
/// 2. `config/{env}.toml`: environment overlay (development, testing, production)
/// 3. Environment variables with prefix `RIVULET_` (double underscore for nesting)
///
/// # Example
///
/// `RIVULET_FEED__BACKOFF_CAP_MS=60000` overrides `feed.backoff_cap_ms`.
pub fn load_config(config_dir: &Path, env: &str) -> anyhow::Result<RivuletConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(config_dir.join("default.toml")).required(true))
    .add_source(config::File::from(config_dir.join(format!("{}.toml", env))).required(false))
    .add_source(
      config::Environment::with_prefix("RIVULET")
        .separator("__")
        .try_parsing(true),
    )
    .build()?;

  let cfg: RivuletConfig = settings.try_deserialize()?;
  cfg.validate()?;
  Ok(cfg)
}
