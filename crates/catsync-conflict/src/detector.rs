//! Failure classification
//!
//! Maps a failed catalog write onto one of three handling classes. The
//! mapping is a single pure function over the normalised error inputs so
//! that every caller (retry loop, report, metrics) agrees on it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use catsync_core::ports::{CatalogError, ErrorCode, TransportFault};

/// How a failed write must be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The write referenced a stale version; refresh, reconcile and retry
    VersionConflict,
    /// Transient failure; retry after backoff
    Retryable,
    /// Permanent failure; do not retry
    Fatal,
}

impl ErrorClass {
    /// Short label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::VersionConflict => "version_conflict",
            ErrorClass::Retryable => "retryable",
            ErrorClass::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn is_fatal_code(code: &ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::BadRequest
            | ErrorCode::InvalidValue
            | ErrorCode::MissingRequiredParameter
            | ErrorCode::NotFound
            | ErrorCode::Unauthorized
            | ErrorCode::Forbidden
    )
}

fn is_transient_code(code: &ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::InternalServerError | ErrorCode::ServiceUnavailable | ErrorCode::GatewayTimeout
    )
}

fn classify_status(status: u16) -> Option<ErrorClass> {
    match status {
        409 => Some(ErrorClass::VersionConflict),
        408 | 429 => Some(ErrorClass::Retryable),
        500..=599 => Some(ErrorClass::Retryable),
        400..=499 => Some(ErrorClass::Fatal),
        _ => None,
    }
}

/// Classifies a failure from its normalised inputs
///
/// Precedence, first match wins:
/// 1. any `VERSION_MISMATCH` code
/// 2. any `RATE_LIMITED` code
/// 3. any permanent request/auth code
/// 4. any transient service code
/// 5. the HTTP status, when no code was recognised
/// 6. the transport fault, when there was no structured payload at all
///
/// Anything left over is fatal.
pub fn classify(
    codes: &[ErrorCode],
    transport_fault: Option<TransportFault>,
    http_status: Option<u16>,
) -> ErrorClass {
    if codes.iter().any(|c| *c == ErrorCode::VersionMismatch) {
        return ErrorClass::VersionConflict;
    }
    if codes.iter().any(|c| *c == ErrorCode::RateLimited) {
        return ErrorClass::Retryable;
    }
    if codes.iter().any(is_fatal_code) {
        return ErrorClass::Fatal;
    }
    if codes.iter().any(is_transient_code) {
        return ErrorClass::Retryable;
    }
    if let Some(class) = http_status.and_then(classify_status) {
        return class;
    }
    match transport_fault {
        Some(TransportFault::Timeout)
        | Some(TransportFault::ConnectionReset)
        | Some(TransportFault::ConnectionRefused) => ErrorClass::Retryable,
        _ => ErrorClass::Fatal,
    }
}

/// Classifies errors returned by the catalog service port
pub struct ConflictDetector;

impl ConflictDetector {
    /// Normalises a [`CatalogError`] and classifies it
    pub fn classify_error(error: &CatalogError) -> ErrorClass {
        let class = match error {
            CatalogError::Remote { status, errors, .. } => {
                let codes: Vec<ErrorCode> = errors.iter().map(|e| e.code.clone()).collect();
                classify(&codes, None, *status)
            }
            CatalogError::Transport { fault, .. } => classify(&[], Some(*fault), None),
            CatalogError::InvalidResponse(_) | CatalogError::MissingCredentials(_) => {
                classify(&[], None, None)
            }
        };

        debug!(class = %class, error = %error, "Classified catalog error");
        class
    }
}
