//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the engine depends on, but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICatalogService`] - Batch write and read against the remote versioned catalog

pub mod catalog_service;

pub use catalog_service::{
    CatalogError, ErrorCode, ICatalogService, IdMapping, RemoteErrorDetail, TransportFault,
    UpsertResponse,
};
