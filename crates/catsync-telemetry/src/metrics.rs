//! Prometheus metrics registry for catsync
//!
//! Provides typed, labeled counters, gauges, and histograms for the batch
//! synchronizer: every write attempt, its latency, recovered conflicts and
//! the final outcome of each object.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Central metrics registry holding all synchronization metrics.
pub struct SyncMetrics {
    registry: Registry,
    /// Counter: batch write attempts by (tenant, result)
    pub write_attempts_total: IntCounterVec,
    /// Histogram: batch write latency in seconds
    pub write_latency_seconds: HistogramVec,
    /// Counter: objects whose version conflict was reconciled and written
    pub conflicts_recovered_total: IntCounterVec,
    /// Counter: objects by final outcome (succeeded, failed, not_attempted)
    pub objects_total: IntCounterVec,
    /// Gauge: batch size used by the most recent run
    pub batch_size: IntGaugeVec,
}

impl std::fmt::Debug for SyncMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMetrics").finish_non_exhaustive()
    }
}

impl SyncMetrics {
    /// Creates a new `SyncMetrics` with all metrics registered.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new_custom(Some("catsync".to_string()), None)?;

        let write_attempts_total = IntCounterVec::new(
            Opts::new("write_attempts_total", "Batch write attempts by result"),
            &["tenant", "result"],
        )?;
        registry.register(Box::new(write_attempts_total.clone()))?;

        let write_latency_seconds = HistogramVec::new(
            HistogramOpts::new("write_latency_seconds", "Batch write latency in seconds")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["tenant"],
        )?;
        registry.register(Box::new(write_latency_seconds.clone()))?;

        let conflicts_recovered_total = IntCounterVec::new(
            Opts::new(
                "conflicts_recovered_total",
                "Objects written after reconciling a version conflict",
            ),
            &["tenant"],
        )?;
        registry.register(Box::new(conflicts_recovered_total.clone()))?;

        let objects_total = IntCounterVec::new(
            Opts::new("objects_total", "Objects by final synchronization outcome"),
            &["tenant", "outcome"],
        )?;
        registry.register(Box::new(objects_total.clone()))?;

        let batch_size = IntGaugeVec::new(
            Opts::new("batch_size", "Batch size used by the most recent run"),
            &["tenant"],
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            registry,
            write_attempts_total,
            write_latency_seconds,
            conflicts_recovered_total,
            objects_total,
            batch_size,
        })
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    /// Record one write attempt and its latency.
    ///
    /// `result` is `success` or the failure class (`version_conflict`,
    /// `retryable`, `fatal`).
    pub fn record_attempt(&self, tenant: &str, result: &str, latency_secs: f64) {
        self.write_attempts_total
            .with_label_values(&[tenant, result])
            .inc();
        self.write_latency_seconds
            .with_label_values(&[tenant])
            .observe(latency_secs);
    }

    /// Record objects written after a recovered conflict.
    pub fn record_conflicts_recovered(&self, tenant: &str, count: u64) {
        self.conflicts_recovered_total
            .with_label_values(&[tenant])
            .inc_by(count);
    }

    /// Record final object outcomes.
    pub fn record_objects(&self, tenant: &str, outcome: &str, count: u64) {
        self.objects_total
            .with_label_values(&[tenant, outcome])
            .inc_by(count);
    }

    /// Set the batch size gauge for a tenant.
    pub fn set_batch_size(&self, tenant: &str, size: usize) {
        self.batch_size
            .with_label_values(&[tenant])
            .set(i64::try_from(size).unwrap_or(i64::MAX));
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
