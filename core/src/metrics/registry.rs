use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use shared::metrics::labels::{
  LABEL_ADMIN, LABEL_COLLECTION, LABEL_ERROR, LABEL_OP, LABEL_PUSH, LABEL_REASON,
};

/// Central Prometheus metrics registry for the live-query engine.
pub struct MetricsRegistry {
  pub registry: Registry,
  // Session metrics
  pub active_sessions: IntGauge,
  pub handshakes_rejected: IntCounterVec,
  // Dispatch metrics
  pub events_dispatched: IntCounterVec,
  pub pushes_emitted: IntCounterVec,
  pub pushes_dropped: IntCounter,
  pub dispatch_latency: Histogram,
  pub resyncs: IntCounter,
  // Feed metrics
  pub events_forwarded: IntCounter,
  pub admin_events_skipped: IntCounterVec,
  pub feed_reconnects: IntCounterVec,
}

impl MetricsRegistry {
  pub fn new() -> anyhow::Result<Self> {
    let registry = Registry::new();

    let active_sessions = IntGauge::new(
      "rivulet_active_sessions",
      "Number of sessions with a live subscription",
    )?;
    let handshakes_rejected = IntCounterVec::new(
      Opts::new(
        "rivulet_handshakes_rejected_total",
        "Handshakes rejected before a subscription was created",
      ),
      &[LABEL_ERROR],
    )?;

    let events_dispatched = IntCounterVec::new(
      Opts::new(
        "rivulet_events_dispatched_total",
        "Change events fanned out to subscriptions",
      ),
      &[LABEL_OP, LABEL_COLLECTION],
    )?;
    let pushes_emitted = IntCounterVec::new(
      Opts::new("rivulet_pushes_emitted_total", "Push events sent to sessions"),
      &[LABEL_PUSH],
    )?;
    let pushes_dropped = IntCounter::new(
      "rivulet_pushes_dropped_total",
      "Push events dropped because the session was gone",
    )?;
    let dispatch_latency = Histogram::with_opts(
      HistogramOpts::new(
        "rivulet_dispatch_latency_seconds",
        "Time to fan one change event out to every subscriber",
      )
      .buckets(vec![0.00001, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
    )?;
    let resyncs = IntCounter::new(
      "rivulet_resyncs_total",
      "Subscriptions re-seeded after a feed reconnect",
    )?;

    let events_forwarded = IntCounter::new(
      "rivulet_feed_events_forwarded_total",
      "Data events forwarded by the feed connector",
    )?;
    let admin_events_skipped = IntCounterVec::new(
      Opts::new(
        "rivulet_feed_admin_events_skipped_total",
        "Administrative change-stream events filtered out",
      ),
      &[LABEL_ADMIN],
    )?;
    let feed_reconnects = IntCounterVec::new(
      Opts::new("rivulet_feed_reconnects_total", "Change stream reopen attempts"),
      &[LABEL_REASON],
    )?;

    // Register all metrics
    registry.register(Box::new(active_sessions.clone()))?;
    registry.register(Box::new(handshakes_rejected.clone()))?;
    registry.register(Box::new(events_dispatched.clone()))?;
    registry.register(Box::new(pushes_emitted.clone()))?;
    registry.register(Box::new(pushes_dropped.clone()))?;
    registry.register(Box::new(dispatch_latency.clone()))?;
    registry.register(Box::new(resyncs.clone()))?;
    registry.register(Box::new(events_forwarded.clone()))?;
    registry.register(Box::new(admin_events_skipped.clone()))?;
    registry.register(Box::new(feed_reconnects.clone()))?;

    Ok(Self {
      registry,
      active_sessions,
      handshakes_rejected,
      events_dispatched,
      pushes_emitted,
      pushes_dropped,
      dispatch_latency,
      resyncs,
      events_forwarded,
      admin_events_skipped,
      feed_reconnects,
    })
  }

  /// Encode all metrics in Prometheus text format.
  pub fn encode(&self) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = self.registry.gather();
    let mut buf = Vec::new();
    encoder.encode(&families, &mut buf).unwrap_or_default();
    String::from_utf8(buf).unwrap_or_default()
  }
}
