use anyhow::Context;
use shared::config::RuntimeSettings;
use tokio::runtime::{Builder, Runtime};
use tracing::info;

const THREAD_NAME: &str = "rivulet-worker";

/// Shape of the multi-threaded runtime the daemon runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
  pub worker_threads: usize,
  pub thread_name: &'static str,
}

impl RuntimeConfig {
  /// Explicit `runtime.worker_threads` wins; zero or unset means one
  /// worker per available core.
  pub fn from_settings(settings: &RuntimeSettings) -> Self {
    let worker_threads = settings
      .worker_threads
      .filter(|n| *n > 0)
      .unwrap_or_else(available_cores);
    Self {
      worker_threads,
      thread_name: THREAD_NAME,
    }
  }

  pub fn build_runtime(&self) -> anyhow::Result<Runtime> {
    let rt = Builder::new_multi_thread()
      .worker_threads(self.worker_threads)
      .thread_name(self.thread_name)
      .enable_all()
      .build()
      .context("failed to build tokio runtime")?;

    info!(workers = self.worker_threads, "tokio runtime configured");
    Ok(rt)
  }
}

fn available_cores() -> usize {
  std::thread::available_parallelism()
    .map(|n| n.get())
    .unwrap_or(2)
}
