use rivulet_core::catalog::EntityCatalog;
use rivulet_core::daemon::{Lifecycle, LifecycleState, RuntimeConfig};
use rivulet_core::dispatch::FnListener;
use rivulet_core::metrics::MetricsRegistry;
use rivulet_core::RealtimeBuilder;
use rivulet_http::egress::ChannelTransport;
use rivulet_http::health::HealthEndpoint;
use rivulet_memory::MemoryStore;
use shared::config::{self, RivuletConfig};
use shared::event::ChangeEvent;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
  let env = std::env::var("RIVULET_ENV").unwrap_or_else(|_| "development".to_string());
  let config_dir = Path::new("config");
  let cfg = config::load_config(config_dir, &env)?;

  init_logging(&cfg.observability.log_level);
  info!(env = %env, "rivulet live query daemon starting");

  let runtime_cfg = RuntimeConfig::from_settings(&cfg.runtime);
  let rt = runtime_cfg.build_runtime()?;

  rt.block_on(async move { run_daemon(cfg).await })
}

async fn run_daemon(cfg: RivuletConfig) -> anyhow::Result<()> {
  let mut lifecycle = Lifecycle::new();

  // Phase 1: Initialize
  let metrics = Arc::new(MetricsRegistry::new()?);
  let catalog = Arc::new(EntityCatalog::from_config(&cfg.catalog)?);
  info!(
    entities = catalog.len(),
    collections = ?catalog.collections(),
    "entity catalog loaded"
  );

  let store = Arc::new(MemoryStore::new());
  let transport = Arc::new(ChannelTransport::new());
  let health = HealthEndpoint::new();

  let service = RealtimeBuilder::new(catalog, cfg.feed.clone())
    .with_metrics(Arc::clone(&metrics))
    .register_change_listener(Arc::new(FnListener(|event: &ChangeEvent| {
      debug!(event = %event.app_event_name(), document = %event.document_id, "application event");
    })))
    .start(store.clone(), store, transport)?;
  let _feed_health = health.track_feed(service.subscribe_connector_state());

  // Phase 2: Running
  lifecycle.transition(LifecycleState::Running);
  health.set_ready();
  info!(metrics_addr = %cfg.observability.metrics_addr, "daemon is ready");

  Lifecycle::wait_for_shutdown().await;

  // Phase 3: Shutdown
  lifecycle.transition(LifecycleState::ShuttingDown);
  health.set_not_ready();
  info!("shutting down");

  service.shutdown().await;
  health.set_not_live();
  debug!(metrics = %metrics.encode(), "final metrics");

  lifecycle.transition(LifecycleState::Stopped);
  info!("rivulet live query daemon stopped");

  Ok(())
}

fn init_logging(default_level: &str) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_thread_ids(true)
    .init();
}
