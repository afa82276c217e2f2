//! catsync Telemetry - Observability for synchronization runs
//!
//! Provides:
//! - `SyncMetrics`: Prometheus counters, gauges and histograms for write
//!   attempts, latencies, recovered conflicts and per-object outcomes

pub mod metrics;

pub use metrics::SyncMetrics;
