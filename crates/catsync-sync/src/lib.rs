//! catsync Sync - Version-safe batch synchronization engine
//!
//! Provides:
//! - Per-object version cache that never moves backwards
//! - Adaptive retry with conflict refresh, exponential backoff and jitter
//! - Per-tenant throughput optimizer deriving batch size and concurrency
//! - The batch synchronizer tying them together
//!
//! ## Modules
//!
//! - [`engine`] - [`BatchSynchronizer`] partitioning, scheduling and reporting
//! - [`retry`] - Attempt state machine and backoff
//! - [`optimizer`] - Performance profiles and batch config derivation
//! - [`version_cache`] - Last observed remote versions

pub mod engine;
pub mod optimizer;
pub mod retry;
pub mod version_cache;

use thiserror::Error;

pub use engine::{BatchSynchronizer, ObjectOutcome, ObjectReport, SyncOptions, SyncReport};
pub use optimizer::{
    derive_batch_config, BatchConfig, OptimizerConfig, Outcome, PerformanceProfile,
    PerformanceTier, ThroughputOptimizer,
};
pub use retry::{with_adaptive_retry, RetryError, RetryPolicy, RetryableWrite, TerminalState};
pub use version_cache::{VersionCache, VersionCacheEntry};

/// Errors that abort a synchronization run before any write
///
/// Failures of individual objects never surface here; they are reported in
/// the [`SyncReport`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The desired objects failed validation (e.g. duplicate IDs)
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] catsync_core::domain::DomainError),

    /// The run options are unusable (e.g. a batch size of zero)
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A batch task panicked or was aborted
    #[error("Batch task failed: {0}")]
    TaskFailed(String),
}
