//! Catalog REST API client
//!
//! [`CatalogClient`] implements [`ICatalogService`] with `reqwest`. Each
//! call is exactly one HTTP request; failures are mapped to
//! [`CatalogError`] so the engine can classify them:
//!
//! - structured `errors` bodies become [`CatalogError::Remote`] with the
//!   HTTP status and any `Retry-After` delay
//! - network failures become [`CatalogError::Transport`] with a
//!   [`TransportFault`]
//! - undecodable bodies become [`CatalogError::InvalidResponse`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use catsync_client::{CatalogClient, ClientConfig};
//! use catsync_core::config::ServiceConfig;
//! use catsync_core::domain::TenantId;
//!
//! # fn example() -> anyhow::Result<()> {
//! let tenant = TenantId::new("merchant-1")?;
//! let config = ClientConfig::from_service(&ServiceConfig::default())
//!     .with_token(tenant, "access-token-here");
//! let client = CatalogClient::new(config)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use tracing::{debug, warn};

use catsync_core::config::ServiceConfig;
use catsync_core::domain::{CatalogObject, ObjectId, TenantId};
use catsync_core::ports::{
    CatalogError, ICatalogService, RemoteErrorDetail, TransportFault, UpsertResponse,
};

use crate::retry_after::parse_retry_after;
use crate::wire::{
    decode_objects, encode_object, BatchRetrieveRequest, BatchRetrieveResponse,
    BatchUpsertRequest, BatchUpsertResponse, ErrorResponse, UpsertBatch, WireError,
};

const BATCH_UPSERT_PATH: &str = "/v2/catalog/batch-upsert";
const BATCH_RETRIEVE_PATH: &str = "/v2/catalog/batch-retrieve";

/// Header carrying the API version
const API_VERSION_HEADER: &str = "Square-Version";

/// Wait assumed when a `Retry-After` header is present but unusable
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

// ============================================================================
// ClientConfig
// ============================================================================

/// Connection settings and per-tenant credentials
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_version: String,
    pub request_timeout: Duration,
    tokens: HashMap<TenantId, String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("request_timeout", &self.request_timeout)
            .field("tenants", &self.tokens.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ClientConfig {
    /// Builds a configuration from the `service` config section, with no
    /// credentials
    pub fn from_service(service: &ServiceConfig) -> Self {
        Self {
            base_url: service.base_url.trim_end_matches('/').to_string(),
            api_version: service.api_version.clone(),
            request_timeout: Duration::from_secs(service.request_timeout_secs.max(1)),
            tokens: HashMap::new(),
        }
    }

    /// Overrides the base URL (useful for testing)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Registers the bearer token for a tenant
    pub fn with_token(mut self, tenant: TenantId, token: impl Into<String>) -> Self {
        self.tokens.insert(tenant, token.into());
        self
    }

    pub fn has_token(&self, tenant: &TenantId) -> bool {
        self.tokens.contains_key(tenant)
    }
}

// ============================================================================
// CatalogClient
// ============================================================================

/// HTTP client for the catalog batch endpoints
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    config: ClientConfig,
}

impl CatalogClient {
    /// Creates a client with the configured request timeout
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("catsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn token(&self, tenant: &TenantId) -> Result<&str, CatalogError> {
        self.config
            .tokens
            .get(tenant)
            .map(String::as_str)
            .ok_or_else(|| CatalogError::MissingCredentials(tenant.clone()))
    }

    /// Sends one POST and decodes the response
    ///
    /// `request_ids` lets index-based error fields be attributed to objects.
    async fn post<B, R>(
        &self,
        tenant: &TenantId,
        path: &str,
        body: &B,
        request_ids: &[ObjectId],
    ) -> Result<R, CatalogError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let token = self.token(tenant)?;
        let url = format!("{}{}", self.config.base_url, path);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(API_VERSION_HEADER, &self.config.api_version)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(|v| parse_retry_after(v, DEFAULT_RETRY_AFTER));
        let bytes = response.bytes().await.map_err(map_transport_error)?;

        debug!(
            tenant = %tenant,
            path,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Catalog request completed"
        );

        if !status.is_success() {
            let errors = serde_json::from_slice::<ErrorResponse>(&bytes)
                .map(|body| body.errors)
                .unwrap_or_else(|e| {
                    warn!(status = status.as_u16(), error = %e, "Error response without a structured body");
                    Vec::new()
                });
            return Err(remote_error(status, errors, retry_after, request_ids));
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            CatalogError::InvalidResponse(format!("failed to decode {} response: {}", path, e))
        })
    }
}

#[async_trait]
impl ICatalogService for CatalogClient {
    #[tracing::instrument(
        skip(self, objects),
        fields(tenant = %tenant, objects = objects.len(), write_id = %write_id)
    )]
    async fn batch_upsert(
        &self,
        tenant: &TenantId,
        objects: &[CatalogObject],
        write_id: Uuid,
    ) -> Result<UpsertResponse, CatalogError> {
        let batches = vec![UpsertBatch {
            objects: objects.iter().map(encode_object).collect(),
        }];
        let body = BatchUpsertRequest {
            idempotency_key: idempotency_key(write_id, tenant, &batches)?,
            batches,
        };
        let request_ids: Vec<ObjectId> = objects.iter().map(|o| o.id().clone()).collect();

        let response: BatchUpsertResponse = self
            .post(tenant, BATCH_UPSERT_PATH, &body, &request_ids)
            .await?;
        if !response.errors.is_empty() {
            return Err(remote_error(StatusCode::OK, response.errors, None, &request_ids));
        }

        Ok(UpsertResponse {
            objects: decode_objects(response.objects)?,
            id_mappings: response.id_mappings,
        })
    }

    #[tracing::instrument(skip(self, ids), fields(tenant = %tenant, ids = ids.len()))]
    async fn batch_retrieve(
        &self,
        tenant: &TenantId,
        ids: &[ObjectId],
    ) -> Result<Vec<CatalogObject>, CatalogError> {
        let body = BatchRetrieveRequest { object_ids: ids };
        let response: BatchRetrieveResponse =
            self.post(tenant, BATCH_RETRIEVE_PATH, &body, ids).await?;
        if !response.errors.is_empty() {
            return Err(remote_error(StatusCode::OK, response.errors, None, ids));
        }
        decode_objects(response.objects)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// SHA-256 over write id, tenant and batches, hex encoded
///
/// A resend within one write (same id, same body) carries the same key and
/// is deduplicated by the service. A new write never matches an earlier
/// one, so it is always checked against current versions.
fn idempotency_key(
    write_id: Uuid,
    tenant: &TenantId,
    batches: &[UpsertBatch],
) -> Result<String, CatalogError> {
    let encoded = serde_json::to_vec(batches)
        .map_err(|e| CatalogError::transport(TransportFault::Other, e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(write_id.as_bytes());
    hasher.update(tenant.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(&encoded);
    Ok(format!("{:x}", hasher.finalize()))
}

fn remote_error(
    status: StatusCode,
    errors: Vec<WireError>,
    retry_after: Option<Duration>,
    request_ids: &[ObjectId],
) -> CatalogError {
    let errors: Vec<RemoteErrorDetail> = errors
        .into_iter()
        .map(|e| e.into_detail(request_ids))
        .collect();
    CatalogError::Remote {
        status: Some(status.as_u16()),
        errors,
        retry_after,
    }
}

/// Maps a `reqwest` failure to a transport fault
///
/// The source chain is searched for an `io::Error` first, so resets and
/// refusals are told apart even when `reqwest` reports both as connect
/// errors.
fn map_transport_error(err: reqwest::Error) -> CatalogError {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    let mut io_kind = None;
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            io_kind = Some(io_err.kind());
            break;
        }
        source = inner.source();
    }

    let fault = match io_kind {
        Some(io::ErrorKind::TimedOut) => TransportFault::Timeout,
        Some(
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof,
        ) => TransportFault::ConnectionReset,
        Some(io::ErrorKind::ConnectionRefused) => TransportFault::ConnectionRefused,
        _ if err.is_timeout() => TransportFault::Timeout,
        _ if err.is_connect() => TransportFault::ConnectionRefused,
        _ => TransportFault::Other,
    };
    CatalogError::transport(fault, err.to_string())
}
