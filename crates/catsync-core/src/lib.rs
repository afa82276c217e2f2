//! catsync Core - Domain types, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `CatalogObject`, `ObjectId`, `TenantId`, `ObjectType`
//! - **Port definitions** - `ICatalogService`, the remote versioned catalog
//! - **Configuration** - YAML-backed settings for retry, optimizer and client
//!
//! # Architecture
//!
//! The domain module holds plain data with validation at construction time.
//! Ports define the trait interfaces that adapter crates implement
//! (`catsync-client` for HTTP, in-memory fakes in tests). The engine in
//! `catsync-sync` only ever talks to the port.

pub mod config;
pub mod domain;
pub mod ports;
