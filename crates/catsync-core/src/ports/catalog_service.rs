//! Catalog service port (driven/secondary port)
//!
//! This module defines the interface to the remote, versioned catalog
//! service. The primary implementation is the HTTP adapter in
//! `catsync-client`; tests use in-memory fakes.
//!
//! ## Design Notes
//!
//! - Unlike most ports, failures are returned as a typed [`CatalogError`]
//!   rather than `anyhow::Error`: the engine must classify them
//!   structurally (version conflict, retryable, fatal).
//! - Error codes are normalised into [`ErrorCode`] so classification does
//!   not depend on any one service's exact error schema.
//! - Uses `#[async_trait]` for async trait methods.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{CatalogObject, ObjectId, TenantId};

// ============================================================================
// ErrorCode
// ============================================================================

/// Normalised error code from the catalog service's structured error list
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The object version in the request is stale
    VersionMismatch,
    /// Too many requests for this tenant
    RateLimited,
    InternalServerError,
    ServiceUnavailable,
    GatewayTimeout,
    BadRequest,
    InvalidValue,
    MissingRequiredParameter,
    NotFound,
    Unauthorized,
    Forbidden,
    /// A code this engine does not know about (kept verbatim)
    Other(String),
}

impl ErrorCode {
    /// Maps a wire code (e.g. `"VERSION_MISMATCH"`) to an [`ErrorCode`]
    pub fn from_wire(code: &str) -> Self {
        match code {
            "VERSION_MISMATCH" => ErrorCode::VersionMismatch,
            "RATE_LIMITED" => ErrorCode::RateLimited,
            "INTERNAL_SERVER_ERROR" => ErrorCode::InternalServerError,
            "SERVICE_UNAVAILABLE" => ErrorCode::ServiceUnavailable,
            "GATEWAY_TIMEOUT" => ErrorCode::GatewayTimeout,
            "BAD_REQUEST" => ErrorCode::BadRequest,
            "INVALID_VALUE" => ErrorCode::InvalidValue,
            "MISSING_REQUIRED_PARAMETER" => ErrorCode::MissingRequiredParameter,
            "NOT_FOUND" => ErrorCode::NotFound,
            "UNAUTHORIZED" => ErrorCode::Unauthorized,
            "FORBIDDEN" => ErrorCode::Forbidden,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    /// Returns the wire representation of this code
    pub fn as_wire(&self) -> &str {
        match self {
            ErrorCode::VersionMismatch => "VERSION_MISMATCH",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::GatewayTimeout => "GATEWAY_TIMEOUT",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InvalidValue => "INVALID_VALUE",
            ErrorCode::MissingRequiredParameter => "MISSING_REQUIRED_PARAMETER",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

// ============================================================================
// RemoteErrorDetail / TransportFault
// ============================================================================

/// One entry of the structured error list returned by the catalog service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteErrorDetail {
    /// Error category (e.g. `INVALID_REQUEST_ERROR`, `RATE_LIMIT_ERROR`)
    pub category: String,
    /// Normalised error code
    pub code: ErrorCode,
    /// Human-readable detail
    pub detail: String,
    /// Offending request field, if reported
    pub field: Option<String>,
    /// Offending object, if the service names one
    pub object_id: Option<ObjectId>,
}

impl RemoteErrorDetail {
    /// Creates a detail with only a code and message
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            category: String::new(),
            code,
            detail: detail.into(),
            field: None,
            object_id: None,
        }
    }

    /// Attaches the offending object ID
    pub fn for_object(mut self, id: ObjectId) -> Self {
        self.object_id = Some(id);
        self
    }
}

/// Transport-level failure with no structured payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    Timeout,
    ConnectionReset,
    ConnectionRefused,
    /// Request could not be built or sent for a non-network reason
    Other,
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportFault::Timeout => "timeout",
            TransportFault::ConnectionReset => "connection reset",
            TransportFault::ConnectionRefused => "connection refused",
            TransportFault::Other => "transport error",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// CatalogError
// ============================================================================

/// A failed call to the catalog service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The service answered with a structured error list
    #[error("catalog service rejected request (status {status:?}): {}", summarize(errors))]
    Remote {
        /// HTTP status, when the adapter is HTTP based
        status: Option<u16>,
        /// Structured error list (may be empty)
        errors: Vec<RemoteErrorDetail>,
        /// Server-requested wait before retrying
        retry_after: Option<Duration>,
    },

    /// The request never produced a service response
    #[error("transport failure ({fault}): {message}")]
    Transport {
        fault: TransportFault,
        message: String,
    },

    /// The response could not be parsed or was inconsistent
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No credentials are configured for the tenant
    #[error("no credentials configured for tenant {0}")]
    MissingCredentials(TenantId),
}

fn summarize(errors: &[RemoteErrorDetail]) -> String {
    if errors.is_empty() {
        return "no error details".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.detail))
        .collect::<Vec<_>>()
        .join("; ")
}

impl CatalogError {
    /// Convenience constructor for a structured rejection
    pub fn remote(status: Option<u16>, errors: Vec<RemoteErrorDetail>) -> Self {
        CatalogError::Remote {
            status,
            errors,
            retry_after: None,
        }
    }

    /// Convenience constructor for a transport failure
    pub fn transport(fault: TransportFault, message: impl Into<String>) -> Self {
        CatalogError::Transport {
            fault,
            message: message.into(),
        }
    }

    /// Normalised codes of the structured error list (empty if none)
    pub fn codes(&self) -> Vec<&ErrorCode> {
        match self {
            CatalogError::Remote { errors, .. } => errors.iter().map(|e| &e.code).collect(),
            _ => Vec::new(),
        }
    }

    /// The first reported code, used for profile bookkeeping
    pub fn primary_code(&self) -> Option<&ErrorCode> {
        self.codes().into_iter().next()
    }

    /// HTTP status, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Remote { status, .. } => *status,
            _ => None,
        }
    }

    /// Transport fault, if the request failed below the service layer
    pub fn transport_fault(&self) -> Option<TransportFault> {
        match self {
            CatalogError::Transport { fault, .. } => Some(*fault),
            _ => None,
        }
    }

    /// True if the service throttled the request (by code or by status)
    pub fn is_rate_limited(&self) -> bool {
        self.codes().contains(&&ErrorCode::RateLimited) || self.status() == Some(429)
    }

    /// Server-requested retry delay, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CatalogError::Remote { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Object IDs the service blamed for the failure
    pub fn offending_object_ids(&self) -> Vec<ObjectId> {
        match self {
            CatalogError::Remote { errors, .. } => {
                let mut ids: Vec<ObjectId> =
                    errors.iter().filter_map(|e| e.object_id.clone()).collect();
                ids.sort();
                ids.dedup();
                ids
            }
            _ => Vec::new(),
        }
    }
}

// ============================================================================
// UpsertResponse
// ============================================================================

/// Mapping of a client placeholder ID to the ID assigned by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMapping {
    pub client_object_id: ObjectId,
    pub object_id: ObjectId,
}

/// Result of a successful batch write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertResponse {
    /// Objects as written, with server IDs and new versions
    pub objects: Vec<CatalogObject>,
    /// Placeholder → server ID mappings for newly created objects
    pub id_mappings: Vec<IdMapping>,
}

impl UpsertResponse {
    /// Resolves the server ID for a requested ID (identity for stable IDs)
    pub fn resolve_id<'a>(&'a self, requested: &'a ObjectId) -> &'a ObjectId {
        self.id_mappings
            .iter()
            .find(|m| &m.client_object_id == requested)
            .map(|m| &m.object_id)
            .unwrap_or(requested)
    }

    /// Finds the written object for a requested ID
    pub fn written_object(&self, requested: &ObjectId) -> Option<&CatalogObject> {
        let id = self.resolve_id(requested);
        self.objects.iter().find(|o| o.id() == id)
    }
}

// ============================================================================
// ICatalogService trait
// ============================================================================

/// Port trait for the remote versioned catalog
///
/// ## Implementation Notes
///
/// - `batch_upsert` is a single network call and is atomic on the service
///   side: either every object is written or the whole batch is rejected.
/// - Implementations must not retry internally; retry policy belongs to the
///   engine so that every attempt is visible to the throughput optimizer.
/// - Per-call timeouts are the implementation's responsibility.
#[async_trait::async_trait]
pub trait ICatalogService: Send + Sync {
    /// Writes a batch of objects
    ///
    /// Versioned objects are updates and must carry the current remote
    /// version; unversioned objects with placeholder IDs are creates.
    ///
    /// `write_id` identifies one logical write. Resending an identical body
    /// under the same `write_id` may be answered from the service's
    /// deduplication cache; a fresh `write_id` is always evaluated against
    /// current remote state.
    async fn batch_upsert(
        &self,
        tenant: &TenantId,
        objects: &[CatalogObject],
        write_id: Uuid,
    ) -> Result<UpsertResponse, CatalogError>;

    /// Reads the current remote state of the given objects
    ///
    /// IDs that do not exist remotely are simply absent from the result.
    async fn batch_retrieve(
        &self,
        tenant: &TenantId,
        ids: &[ObjectId],
    ) -> Result<Vec<CatalogObject>, CatalogError>;
}
