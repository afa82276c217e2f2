//! Domain entities and business logic
//!
//! This module contains the core domain types for catsync:
//! - Newtypes for validated identifiers (`ObjectId`, `TenantId`) and type tags
//! - The `CatalogObject` entity
//! - Domain-specific error types

pub mod catalog_object;
pub mod errors;
pub mod newtypes;

// Re-export commonly used types
pub use catalog_object::{validate_unique, CatalogObject, Payload};
pub use errors::DomainError;
pub use newtypes::*;
