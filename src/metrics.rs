/// Metrics Module - Prometheus Instrumentation
///
/// Sync-engine-scoped metrics: once-per-tick latency/size, reorg and
/// checkpoint counters, and window/ring gauges.
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use lazy_static::lazy_static;
use std::time::Instant;

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0];

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Duration of one syncOnce tick
    pub static ref SYNC_ONCE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "syncer_sync_once_duration_seconds",
            "Duration of a single sync tick"
        ).buckets(LATENCY_BUCKETS.to_vec())
    ).unwrap();

    /// Number of epochs committed per syncOnce tick
    pub static ref SYNC_ONCE_BATCH_SIZE: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "syncer_sync_once_batch_size",
            "Number of epochs committed in a single sync tick"
        ).buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0])
    ).unwrap();

    /// Current size of the sliding epoch window
    pub static ref SYNC_WINDOW_SIZE: IntGauge = IntGauge::new(
        "syncer_sync_window_size", "Current size of the outstanding sync window"
    ).unwrap();

    /// Current number of entries held in the pivot info ring
    pub static ref PIVOT_RING_SIZE: IntGauge = IntGauge::new(
        "syncer_pivot_ring_size", "Number of entries currently held in the pivot info ring"
    ).unwrap();

    /// Reorg-triggered reconciliations, split by cause
    pub static ref REORG_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("syncer_reorg_events_total", "Reorg reconciliations by cause"),
        &["cause"]
    ).unwrap();

    /// Checkpoint executions
    pub static ref CHECKPOINT_TOTAL: IntCounter = IntCounter::new(
        "syncer_checkpoint_total", "Total checkpoint executions"
    ).unwrap();

    /// Checkpoint failures (re-triggered on failure)
    pub static ref CHECKPOINT_FAILURES: IntCounter = IntCounter::new(
        "syncer_checkpoint_failures_total", "Total checkpoint failures"
    ).unwrap();

    /// Subscription events rejected by the validator
    pub static ref SUBSCRIPTION_REJECTED: IntCounter = IntCounter::new(
        "syncer_subscription_rejected_total", "Subscription events rejected as non-continuous"
    ).unwrap();

    /// Process start timestamp, seconds since epoch
    pub static ref SERVICE_START_TIMESTAMP: IntGauge = IntGauge::new(
        "syncer_service_start_timestamp_seconds", "Unix timestamp at which the service started"
    ).unwrap();
}

pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    REGISTRY.register(Box::new(SYNC_ONCE_DURATION.clone()))?;
    REGISTRY.register(Box::new(SYNC_ONCE_BATCH_SIZE.clone()))?;
    REGISTRY.register(Box::new(SYNC_WINDOW_SIZE.clone()))?;
    REGISTRY.register(Box::new(PIVOT_RING_SIZE.clone()))?;
    REGISTRY.register(Box::new(REORG_EVENTS.clone()))?;
    REGISTRY.register(Box::new(CHECKPOINT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHECKPOINT_FAILURES.clone()))?;
    REGISTRY.register(Box::new(SUBSCRIPTION_REJECTED.clone()))?;
    REGISTRY.register(Box::new(SERVICE_START_TIMESTAMP.clone()))?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    SERVICE_START_TIMESTAMP.set(now as i64);

    Ok(())
}

/// Gather metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Timer for measuring durations against a histogram.
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn observe(self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        // REGISTRY is process-global and shared across tests; registering
        // twice would error, so only assert it succeeds at least once.
        let _ = init_metrics();
        assert!(SERVICE_START_TIMESTAMP.get() > 0);
    }

    #[test]
    fn test_gather_metrics() {
        let _ = init_metrics();
        SYNC_WINDOW_SIZE.set(42);
        let text = gather_metrics();
        assert!(text.contains("syncer_sync_window_size"));
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        assert!(timer.elapsed_secs() >= 0.0);
    }
}
