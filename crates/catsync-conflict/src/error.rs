//! Error types for the conflict engine

use thiserror::Error;

/// Errors that can occur while setting up reconciliation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// The configured merge strategy name is not recognised
    #[error("unknown merge strategy '{0}'; valid: local_wins, remote_wins, newer_wins")]
    UnknownStrategy(String),
}
