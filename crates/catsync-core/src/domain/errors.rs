//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! identifier validation, payload shape checks and input batch validation.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid catalog object identifier
    #[error("Invalid object ID: {0}")]
    InvalidObjectId(String),

    /// Invalid tenant identifier
    #[error("Invalid tenant ID: {0}")]
    InvalidTenantId(String),

    /// Unknown catalog object type tag
    #[error("Unknown object type: {0}")]
    UnknownObjectType(String),

    /// Invalid version number (versions are non-negative)
    #[error("Invalid version: {0}")]
    InvalidVersion(i64),

    /// The same object ID appears more than once in one request
    #[error("Duplicate object ID in request: {0}")]
    DuplicateObjectId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
