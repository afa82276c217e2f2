//! Reconciliation of desired local state with fetched remote state
//!
//! After a version conflict the engine re-reads the remote objects and folds
//! them into the desired objects before retrying. The merged object always
//! adopts the remote version so the retried write is accepted unless a third
//! writer intervenes again.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use catsync_core::domain::{CatalogObject, ObjectId};

use crate::error::ConflictError;
use crate::strategy::{parse_strategy, LocalWins, MergeStrategy};

/// Merges one local object with its remote counterpart using [`LocalWins`]
///
/// - version comes from `remote`
/// - id, type and `updated_at` come from `local`, so the local edit time
///   survives into later merges
/// - payload is `remote` overlaid by `local`
pub fn merge(local: &CatalogObject, remote: &CatalogObject) -> CatalogObject {
    merge_with(&LocalWins, local, remote)
}

/// Merges one pair with an explicit strategy
pub fn merge_with(
    strategy: &dyn MergeStrategy,
    local: &CatalogObject,
    remote: &CatalogObject,
) -> CatalogObject {
    let payload = strategy.merge_payload(local, remote);
    let mut merged = local.clone().with_payload(payload);
    merged.set_version(remote.version());
    merged
}

/// Reconciles desired objects against fetched remote objects with [`LocalWins`]
///
/// Objects with no remote counterpart (new objects, or objects the service
/// no longer has) pass through unchanged.
pub fn reconcile(
    local_objects: &[CatalogObject],
    remote_objects: &[CatalogObject],
) -> Vec<CatalogObject> {
    Reconciler::default()
        .reconcile_detailed(local_objects, remote_objects)
        .objects
}

/// Result of [`Reconciler::reconcile_detailed`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Reconciled objects, in input order
    pub objects: Vec<CatalogObject>,
    /// IDs whose version changed as a result of merging
    pub conflicted: Vec<ObjectId>,
}

/// Reconciles objects with a configured merge strategy
#[derive(Debug, Clone)]
pub struct Reconciler {
    strategy: Arc<dyn MergeStrategy>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Arc::new(LocalWins))
    }
}

impl Reconciler {
    pub fn new(strategy: Arc<dyn MergeStrategy>) -> Self {
        Self { strategy }
    }

    /// Builds a reconciler from a configuration strategy name
    pub fn from_name(name: &str) -> Result<Self, ConflictError> {
        Ok(Self::new(parse_strategy(name)?))
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Merges a single pair with the configured strategy
    pub fn merge(&self, local: &CatalogObject, remote: &CatalogObject) -> CatalogObject {
        merge_with(self.strategy.as_ref(), local, remote)
    }

    /// Reconciles a set of objects, discarding the conflict report
    pub fn reconcile(
        &self,
        local_objects: &[CatalogObject],
        remote_objects: &[CatalogObject],
    ) -> Vec<CatalogObject> {
        self.reconcile_detailed(local_objects, remote_objects).objects
    }

    /// Reconciles a set of objects and reports which ones adopted a new version
    pub fn reconcile_detailed(
        &self,
        local_objects: &[CatalogObject],
        remote_objects: &[CatalogObject],
    ) -> ReconcileOutcome {
        let remote_by_id: HashMap<&ObjectId, &CatalogObject> =
            remote_objects.iter().map(|o| (o.id(), o)).collect();

        let mut conflicted = Vec::new();
        let objects = local_objects
            .iter()
            .map(|local| match remote_by_id.get(local.id()) {
                Some(remote) => {
                    if local.version() != remote.version() {
                        debug!(
                            id = %local.id(),
                            local_version = ?local.version(),
                            remote_version = ?remote.version(),
                            strategy = self.strategy.name(),
                            "Reconciling diverged object"
                        );
                        conflicted.push(local.id().clone());
                    }
                    self.merge(local, remote)
                }
                None => local.clone(),
            })
            .collect();

        ReconcileOutcome {
            objects,
            conflicted,
        }
    }
}
