//! Batch synchronization engine
//!
//! The [`BatchSynchronizer`] writes a set of desired catalog objects to the
//! remote catalog service for one tenant.
//!
//! ## Sync Flow
//!
//! 1. **Validation**: duplicate IDs abort the run before any write
//! 2. **Version preparation**: unversioned objects with stable IDs adopt the
//!    cached version, or are fetched from the service and reconciled
//! 3. **Partitioning**: batch size and concurrency come from the throughput
//!    optimizer unless overridden per run
//! 4. **Writing**: up to `concurrency` batches in flight, each driven by the
//!    adaptive retry controller; every attempt is fed back to the optimizer
//! 5. **Reporting**: one outcome per input object, in input order
//!
//! A fatal failure never aborts sibling batches. When the service names the
//! offending objects, they are dropped and the rest of the batch is retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use catsync_conflict::{ConflictDetector, ErrorClass, Reconciler};
use catsync_core::domain::{validate_unique, CatalogObject, ObjectId, TenantId};
use catsync_core::ports::{CatalogError, ErrorCode, ICatalogService, UpsertResponse};
use catsync_telemetry::SyncMetrics;

use crate::optimizer::{BatchConfig, OptimizerConfig, Outcome, ThroughputOptimizer};
use crate::retry::{with_adaptive_retry, RetryError, RetryPolicy, RetryableWrite, TerminalState};
use crate::version_cache::VersionCache;
use crate::SyncError;

// ============================================================================
// SyncReport
// ============================================================================

/// Final state of one input object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ObjectOutcome {
    /// Written; `id` is the server ID (differs from the requested ID for
    /// placeholders)
    Succeeded {
        id: ObjectId,
        version: Option<i64>,
        recovered_conflict: bool,
    },
    Failed {
        class: ErrorClass,
        attempts: u32,
        message: String,
    },
    /// The run was cancelled before the object's batch started
    NotAttempted,
}

impl ObjectOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ObjectOutcome::Succeeded { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            ObjectOutcome::Succeeded { .. } => "succeeded",
            ObjectOutcome::Failed { .. } => "failed",
            ObjectOutcome::NotAttempted => "not_attempted",
        }
    }
}

/// Outcome of one input object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectReport {
    /// ID as supplied by the caller
    pub requested_id: ObjectId,
    #[serde(flatten)]
    pub outcome: ObjectOutcome,
}

/// Summary of a completed synchronization run
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub tenant: TenantId,
    /// One entry per input object, in input order
    pub objects: Vec<ObjectReport>,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    /// Objects written after reconciling a version conflict
    pub conflicts_recovered: usize,
    /// Batches started
    pub batches: usize,
    /// Write calls made across all batches
    pub write_attempts: u32,
    pub cancelled: bool,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    fn build(
        tenant: TenantId,
        order: &[ObjectId],
        mut outcomes: HashMap<ObjectId, ObjectOutcome>,
        batches: usize,
        write_attempts: u32,
        cancelled: bool,
        duration: Duration,
    ) -> Self {
        let objects: Vec<ObjectReport> = order
            .iter()
            .map(|id| ObjectReport {
                requested_id: id.clone(),
                outcome: outcomes.remove(id).unwrap_or(ObjectOutcome::NotAttempted),
            })
            .collect();

        let count = |label: &str| objects.iter().filter(|o| o.outcome.label() == label).count();
        let conflicts_recovered = objects
            .iter()
            .filter(|o| {
                matches!(
                    o.outcome,
                    ObjectOutcome::Succeeded {
                        recovered_conflict: true,
                        ..
                    }
                )
            })
            .count();

        Self {
            tenant,
            succeeded: count("succeeded"),
            failed: count("failed"),
            not_attempted: count("not_attempted"),
            conflicts_recovered,
            batches,
            write_attempts,
            cancelled,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            objects,
        }
    }

    /// Outcome for a requested ID
    pub fn outcome(&self, requested_id: &ObjectId) -> Option<&ObjectOutcome> {
        self.objects
            .iter()
            .find(|o| &o.requested_id == requested_id)
            .map(|o| &o.outcome)
    }

    /// Objects that failed
    pub fn failures(&self) -> impl Iterator<Item = &ObjectReport> {
        self.objects
            .iter()
            .filter(|o| matches!(o.outcome, ObjectOutcome::Failed { .. }))
    }

    /// True if every object was written
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_attempted == 0
    }
}

// ============================================================================
// SyncOptions
// ============================================================================

/// Per-run overrides
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Objects per write call; defaults to the optimizer's batch size
    pub batch_size: Option<usize>,
    /// Batches in flight; defaults to the optimizer's concurrency
    pub concurrency: Option<usize>,
    /// Delay before each batch after the first; defaults to the optimizer's
    pub inter_batch_delay: Option<Duration>,
    pub cancel: CancellationToken,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: None,
            concurrency: None,
            inter_batch_delay: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl SyncOptions {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = Some(delay);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

// ============================================================================
// BatchSynchronizer
// ============================================================================

/// Version-safe batch writer
///
/// Owns the version cache and the per-tenant performance profiles; both
/// live as long as the synchronizer and start empty.
pub struct BatchSynchronizer {
    service: Arc<dyn ICatalogService>,
    cache: Arc<VersionCache>,
    optimizer: Arc<ThroughputOptimizer>,
    reconciler: Reconciler,
    metrics: Option<Arc<SyncMetrics>>,
}

impl BatchSynchronizer {
    /// Creates a synchronizer with an empty cache and the default
    /// (local-wins) reconciliation strategy
    pub fn new(service: Arc<dyn ICatalogService>, optimizer_config: OptimizerConfig) -> Self {
        Self {
            service,
            cache: Arc::new(VersionCache::new()),
            optimizer: Arc::new(ThroughputOptimizer::new(optimizer_config)),
            reconciler: Reconciler::default(),
            metrics: None,
        }
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn version_cache(&self) -> &Arc<VersionCache> {
        &self.cache
    }

    pub fn optimizer(&self) -> &Arc<ThroughputOptimizer> {
        &self.optimizer
    }

    /// Current batch parameters for `tenant`
    pub fn get_batch_config(&self, tenant: &TenantId) -> BatchConfig {
        self.optimizer.get_batch_config(tenant)
    }

    /// Feeds an externally observed write outcome to the optimizer
    pub fn record_outcome(&self, tenant: &TenantId, outcome: Outcome) {
        self.optimizer.record_outcome(tenant, outcome);
    }

    /// Writes `objects` with optimizer-chosen batching
    pub async fn synchronize(
        &self,
        objects: Vec<CatalogObject>,
        tenant: &TenantId,
        policy: &RetryPolicy,
    ) -> Result<SyncReport, SyncError> {
        self.synchronize_with(objects, tenant, policy, SyncOptions::default())
            .await
    }

    /// Writes `objects` with per-run overrides and cancellation
    #[tracing::instrument(
        skip(self, objects, tenant, policy, options),
        fields(tenant = %tenant, objects = objects.len())
    )]
    pub async fn synchronize_with(
        &self,
        objects: Vec<CatalogObject>,
        tenant: &TenantId,
        policy: &RetryPolicy,
        options: SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();

        validate_unique(&objects)?;
        if options.batch_size == Some(0) {
            return Err(SyncError::InvalidOptions(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if options.concurrency == Some(0) {
            return Err(SyncError::InvalidOptions(
                "concurrency must be greater than 0".to_string(),
            ));
        }

        let order: Vec<ObjectId> = objects.iter().map(|o| o.id().clone()).collect();
        let cancel = options.cancel.clone();
        let worker = BatchWorker {
            service: Arc::clone(&self.service),
            cache: Arc::clone(&self.cache),
            optimizer: Arc::clone(&self.optimizer),
            reconciler: self.reconciler.clone(),
            metrics: self.metrics.clone(),
            tenant: tenant.clone(),
            policy: policy.clone(),
            cancel: cancel.clone(),
        };

        let mut outcomes: HashMap<ObjectId, ObjectOutcome> = HashMap::with_capacity(order.len());
        let mut batches_started = 0usize;
        let mut write_attempts = 0u32;

        if !objects.is_empty() {
            let objects = worker.prepare_versions(objects).await;

            let batch_config = self.optimizer.get_batch_config(tenant);
            let batch_size = options.batch_size.unwrap_or(batch_config.batch_size).max(1);
            let concurrency = options.concurrency.unwrap_or(batch_config.concurrency).max(1);
            let batches: Vec<Vec<CatalogObject>> =
                objects.chunks(batch_size).map(<[_]>::to_vec).collect();

            info!(
                batch_size,
                concurrency,
                batches = batches.len(),
                tier = %batch_config.tier,
                "Starting synchronization"
            );
            if let Some(metrics) = &self.metrics {
                metrics.set_batch_size(tenant.as_str(), batch_size);
            }

            let semaphore = Arc::new(Semaphore::new(concurrency));
            let mut tasks = JoinSet::new();
            let mut pending = batches.into_iter().enumerate();

            while let Some((index, batch)) = pending.next() {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => Some(
                        permit.map_err(|e| SyncError::TaskFailed(e.to_string()))?,
                    ),
                };

                let mut proceed = permit.is_some();
                if proceed && index > 0 {
                    let delay = options
                        .inter_batch_delay
                        .unwrap_or_else(|| self.optimizer.get_batch_config(tenant).inter_batch_delay);
                    if !delay.is_zero() {
                        debug!(batch = index, delay_ms = delay.as_millis() as u64, "Inter-batch delay");
                        proceed = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => false,
                            _ = tokio::time::sleep(delay) => true,
                        };
                    }
                }

                let Some(permit) = permit.filter(|_| proceed) else {
                    let skipped = batch
                        .into_iter()
                        .chain(pending.by_ref().flat_map(|(_, rest)| rest));
                    for object in skipped {
                        outcomes.insert(object.id().clone(), ObjectOutcome::NotAttempted);
                    }
                    info!(started = batches_started, "Cancelled, no further batches will start");
                    break;
                };

                batches_started += 1;
                let worker = worker.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    worker.run_batch(index, batch).await
                });
            }

            while let Some(joined) = tasks.join_next().await {
                let result = joined.map_err(|e| SyncError::TaskFailed(e.to_string()))?;
                write_attempts += result.attempts;
                outcomes.extend(result.outcomes);
            }
        }

        let report = SyncReport::build(
            tenant.clone(),
            &order,
            outcomes,
            batches_started,
            write_attempts,
            cancel.is_cancelled(),
            started.elapsed(),
        );

        if let Some(metrics) = &self.metrics {
            let name = tenant.as_str();
            metrics.record_objects(name, "succeeded", report.succeeded as u64);
            metrics.record_objects(name, "failed", report.failed as u64);
            metrics.record_objects(name, "not_attempted", report.not_attempted as u64);
            metrics.record_conflicts_recovered(name, report.conflicts_recovered as u64);
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            not_attempted = report.not_attempted,
            conflicts_recovered = report.conflicts_recovered,
            write_attempts = report.write_attempts,
            duration_ms = report.duration_ms,
            "Synchronization finished"
        );

        Ok(report)
    }
}

// ============================================================================
// BatchWorker
// ============================================================================

/// Everything one batch task needs, cheap to clone into spawned tasks
#[derive(Clone)]
struct BatchWorker {
    service: Arc<dyn ICatalogService>,
    cache: Arc<VersionCache>,
    optimizer: Arc<ThroughputOptimizer>,
    reconciler: Reconciler,
    metrics: Option<Arc<SyncMetrics>>,
    tenant: TenantId,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

struct BatchResult {
    outcomes: Vec<(ObjectId, ObjectOutcome)>,
    attempts: u32,
}

impl BatchWorker {
    /// Attaches versions to unversioned objects with stable IDs
    ///
    /// Explicitly versioned objects are trusted as-is; if they are stale the
    /// write conflicts and the batch is reconciled then.
    async fn prepare_versions(&self, mut objects: Vec<CatalogObject>) -> Vec<CatalogObject> {
        let mut unknown = Vec::new();
        for object in objects.iter_mut() {
            if object.version().is_some() || object.id().is_placeholder() {
                continue;
            }
            match self.cache.get_version(object.id()) {
                Some(version) => object.set_version(Some(version)),
                None => unknown.push(object.id().clone()),
            }
        }

        if unknown.is_empty() {
            return objects;
        }

        debug!(count = unknown.len(), "Fetching remote versions before first write");
        let chunk_size = self.optimizer.config().max_batch_size.max(1);
        let mut remote = Vec::with_capacity(unknown.len());
        for chunk in unknown.chunks(chunk_size) {
            match self.fetch(chunk).await {
                Ok(found) => remote.extend(found),
                Err(e) => {
                    warn!(error = %e, "Version refresh failed, writing without remote versions");
                }
            }
        }

        self.cache.record_objects(&remote);
        self.reconciler.reconcile(&objects, &remote)
    }

    async fn fetch(&self, ids: &[ObjectId]) -> Result<Vec<CatalogObject>, RetryError> {
        let service = Arc::clone(&self.service);
        let tenant = self.tenant.clone();
        let ids = ids.to_vec();
        let mut read = move |_attempt: u32| {
            let service = Arc::clone(&service);
            let tenant = tenant.clone();
            let ids = ids.clone();
            async move { service.batch_retrieve(&tenant, &ids).await }
        };
        with_adaptive_retry(&mut read, &self.policy, &self.cancel)
            .await
            .map(|success| success.value)
    }

    /// Feeds one write attempt to the optimizer and metrics
    fn record_attempt(&self, result: &Result<UpsertResponse, CatalogError>, latency: Duration) {
        let (outcome, label) = match result {
            Ok(_) => (Outcome::success(latency), "success"),
            Err(err) => {
                let class = ConflictDetector::classify_error(err);
                let code = if err.is_rate_limited() {
                    Some(ErrorCode::RateLimited)
                } else {
                    err.primary_code().cloned()
                };
                (Outcome::failure(latency, code), class.as_str())
            }
        };

        self.optimizer.record_outcome(&self.tenant, outcome);
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(self.tenant.as_str(), label, latency.as_secs_f64());
        }
    }

    async fn run_batch(self, index: usize, objects: Vec<CatalogObject>) -> BatchResult {
        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(objects.len());
        let mut attempts = 0u32;
        let mut recovered: HashSet<ObjectId> = HashSet::new();
        let mut pending = objects;

        debug!(batch = index, size = pending.len(), "Batch started");

        while !pending.is_empty() {
            let mut write = BatchWrite {
                worker: self.clone(),
                batch: index,
                objects: pending,
                write_id: Uuid::new_v4(),
                recovered: HashSet::new(),
            };
            let result = with_adaptive_retry(&mut write, &self.policy, &self.cancel).await;
            let BatchWrite {
                objects: current,
                recovered: newly_recovered,
                ..
            } = write;
            recovered.extend(newly_recovered);

            let err = match result {
                Ok(success) => {
                    attempts += success.attempts;
                    outcomes.extend(self.apply_success(&current, &success.value, &recovered));
                    break;
                }
                Err(err) => err,
            };
            attempts += err.attempts;

            let blamed: HashSet<ObjectId> = {
                let in_batch: HashSet<&ObjectId> = current.iter().map(|o| o.id()).collect();
                err.source
                    .offending_object_ids()
                    .into_iter()
                    .filter(|id| in_batch.contains(id))
                    .collect()
            };

            if err.state == TerminalState::FatalFailed
                && !blamed.is_empty()
                && blamed.len() < current.len()
            {
                warn!(
                    batch = index,
                    rejected = blamed.len(),
                    remaining = current.len() - blamed.len(),
                    error = %err.source,
                    "Service rejected specific objects, retrying the rest of the batch"
                );
                let (rejected, rest): (Vec<_>, Vec<_>) =
                    current.into_iter().partition(|o| blamed.contains(o.id()));
                for object in rejected {
                    outcomes.push((object.id().clone(), failed(&err, attempts)));
                }
                pending = rest;
                continue;
            }

            warn!(batch = index, state = %err.state, attempts, error = %err.source, "Batch failed");
            for object in current {
                outcomes.push((object.id().clone(), failed(&err, attempts)));
            }
            break;
        }

        info!(
            batch = index,
            attempts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );
        BatchResult { outcomes, attempts }
    }

    /// Records written versions and builds per-object success outcomes
    fn apply_success(
        &self,
        written: &[CatalogObject],
        response: &UpsertResponse,
        recovered: &HashSet<ObjectId>,
    ) -> Vec<(ObjectId, ObjectOutcome)> {
        self.cache.record_objects(&response.objects);
        written
            .iter()
            .map(|object| {
                let requested = object.id();
                let outcome = ObjectOutcome::Succeeded {
                    id: response.resolve_id(requested).clone(),
                    version: response.written_object(requested).and_then(|o| o.version()),
                    recovered_conflict: recovered.contains(requested),
                };
                (requested.clone(), outcome)
            })
            .collect()
    }
}

fn failed(err: &RetryError, attempts: u32) -> ObjectOutcome {
    ObjectOutcome::Failed {
        class: err.class,
        attempts,
        message: err.to_string(),
    }
}

// ============================================================================
// BatchWrite
// ============================================================================

/// One batch as seen by the retry controller
struct BatchWrite {
    worker: BatchWorker,
    batch: usize,
    objects: Vec<CatalogObject>,
    /// Shared by every attempt of this retry loop, fresh for each loop
    write_id: Uuid,
    /// IDs whose version changed during a conflict refresh
    recovered: HashSet<ObjectId>,
}

#[async_trait::async_trait]
impl RetryableWrite for BatchWrite {
    type Output = UpsertResponse;

    async fn attempt(&mut self, attempt: u32) -> Result<UpsertResponse, CatalogError> {
        debug!(
            batch = self.batch,
            attempt,
            size = self.objects.len(),
            write_id = %self.write_id,
            "Writing batch"
        );
        let started = Instant::now();
        let result = self
            .worker
            .service
            .batch_upsert(&self.worker.tenant, &self.objects, self.write_id)
            .await;
        self.worker.record_attempt(&result, started.elapsed());
        result
    }

    async fn refresh_after_conflict(&mut self, _error: &CatalogError) -> Result<(), CatalogError> {
        let ids: Vec<ObjectId> = self
            .objects
            .iter()
            .map(|o| o.id())
            .filter(|id| id.is_stable())
            .cloned()
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let remote = self
            .worker
            .service
            .batch_retrieve(&self.worker.tenant, &ids)
            .await?;
        self.worker.cache.record_objects(&remote);

        let outcome = self.worker.reconciler.reconcile_detailed(&self.objects, &remote);
        info!(
            batch = self.batch,
            conflicted = outcome.conflicted.len(),
            strategy = self.worker.reconciler.strategy_name(),
            "Reconciled batch after version conflict"
        );
        self.recovered.extend(outcome.conflicted);
        self.objects = outcome.objects;
        Ok(())
    }
}
