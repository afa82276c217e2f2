//! catsync Client - HTTP adapter for the remote catalog service
//!
//! Implements [`ICatalogService`](catsync_core::ports::ICatalogService)
//! over the catalog REST API:
//! - `POST /v2/catalog/batch-upsert`
//! - `POST /v2/catalog/batch-retrieve`
//!
//! The adapter never retries; every attempt is driven (and observed) by the
//! synchronization engine.

pub mod client;
pub mod retry_after;
pub mod wire;

pub use client::{CatalogClient, ClientConfig};
pub use retry_after::parse_retry_after;
