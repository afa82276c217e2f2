//! catsync Conflict - Error classification and reconciliation
//!
//! Provides:
//! - Classification of catalog service failures into conflict / retryable / fatal
//! - Shallow payload merging of divergent local and remote objects
//! - Pluggable merge strategies selected by name from configuration

pub mod detector;
pub mod error;
pub mod reconcile;
pub mod strategy;

pub use detector::{classify, ConflictDetector, ErrorClass};
pub use error::ConflictError;
pub use reconcile::{merge, merge_with, reconcile, ReconcileOutcome, Reconciler};
pub use strategy::{parse_strategy, LocalWins, MergeStrategy, NewerWins, RemoteWins};
