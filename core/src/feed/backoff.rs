use std::time::Duration;

/// Exponential reconnect backoff without an attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
  /// Base delay.
  pub base: Duration,
  /// Maximum delay (cap).
  pub cap: Duration,
}

impl Default for Backoff {
  fn default() -> Self {
    Self {
      base: Duration::from_secs(1),
      cap: Duration::from_secs(30),
    }
  }
}

impl Backoff {
  pub fn new(base: Duration, cap: Duration) -> Self {
    Self { base, cap }
  }

  pub fn from_millis(base_ms: u64, cap_ms: u64) -> Self {
    Self::new(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
  }

  /// Delay before retrying after the `failures`-th consecutive failure:
  /// `min(base * 2^failures, cap)`.
  pub fn delay_for(&self, failures: u32) -> Duration {
    let delay = self.base.saturating_mul(2u32.saturating_pow(failures));
    delay.min(self.cap)
  }
}
