//! Merge strategies
//!
//! A strategy decides whose payload keys win when a local object and its
//! remote counterpart both define the same key. Keys present on only one
//! side always survive. The concurrency token is never a strategy concern:
//! merged objects always carry the remote version.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::trace;

use catsync_core::domain::{CatalogObject, Payload};

use crate::error::ConflictError;

/// Combines the payloads of a local object and its remote counterpart
pub trait MergeStrategy: Debug + Send + Sync {
    /// Configuration name of the strategy (e.g. `local_wins`)
    fn name(&self) -> &'static str;

    /// Produces the merged payload
    fn merge_payload(&self, local: &CatalogObject, remote: &CatalogObject) -> Payload;
}

/// Copies `top` over `base`: keys of `top` win, keys only in `base` survive
fn overlay(base: &Payload, top: &Payload) -> Payload {
    let mut merged = base.clone();
    for (key, value) in top {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Local keys win on overlap; remote fills the gaps (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWins;

impl MergeStrategy for LocalWins {
    fn name(&self) -> &'static str {
        "local_wins"
    }

    fn merge_payload(&self, local: &CatalogObject, remote: &CatalogObject) -> Payload {
        overlay(remote.payload(), local.payload())
    }
}

/// Remote keys win on overlap; local fills the gaps
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteWins;

impl MergeStrategy for RemoteWins {
    fn name(&self) -> &'static str {
        "remote_wins"
    }

    fn merge_payload(&self, local: &CatalogObject, remote: &CatalogObject) -> Payload {
        overlay(local.payload(), remote.payload())
    }
}

/// The side with the later `updated_at` wins on overlap
///
/// Falls back to [`LocalWins`] when either timestamp is missing or both are
/// equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewerWins;

impl MergeStrategy for NewerWins {
    fn name(&self) -> &'static str {
        "newer_wins"
    }

    fn merge_payload(&self, local: &CatalogObject, remote: &CatalogObject) -> Payload {
        match (local.updated_at(), remote.updated_at()) {
            (Some(l), Some(r)) if r > l => {
                trace!(id = %local.id(), "Remote copy is newer, remote keys win");
                RemoteWins.merge_payload(local, remote)
            }
            _ => LocalWins.merge_payload(local, remote),
        }
    }
}

/// Parses a configuration strategy name
pub fn parse_strategy(name: &str) -> Result<Arc<dyn MergeStrategy>, ConflictError> {
    match name {
        "local_wins" => Ok(Arc::new(LocalWins)),
        "remote_wins" => Ok(Arc::new(RemoteWins)),
        "newer_wins" => Ok(Arc::new(NewerWins)),
        other => Err(ConflictError::UnknownStrategy(other.to_string())),
    }
}
