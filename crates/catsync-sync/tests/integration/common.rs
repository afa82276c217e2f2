//! Shared test fixtures for the synchronizer integration tests
//!
//! `FakeCatalog` is an in-memory versioned catalog that enforces optimistic
//! concurrency the way the real service does: a write carrying a stale
//! version rejects the whole batch with `VERSION_MISMATCH`. Like the
//! service's idempotency cache, an identical resend under the same write id
//! is answered with the stored response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use catsync_core::domain::{CatalogObject, ObjectId, ObjectType, TenantId};
use catsync_core::ports::{
    CatalogError, ErrorCode, ICatalogService, IdMapping, RemoteErrorDetail, UpsertResponse,
};
use catsync_sync::{BatchSynchronizer, OptimizerConfig, RetryPolicy};

type RejectFn = Box<dyn Fn(&CatalogObject) -> bool + Send + Sync>;

#[derive(Default)]
pub struct FakeCatalog {
    store: Mutex<HashMap<ObjectId, CatalogObject>>,
    /// Errors returned by specific upsert calls (1-based call number)
    scripted: Mutex<HashMap<usize, CatalogError>>,
    reject: Mutex<Option<RejectFn>>,
    cancel_on_upsert: Mutex<Option<CancellationToken>>,
    /// Successful responses by write id, with the request they answered
    replays: Mutex<HashMap<Uuid, (Vec<CatalogObject>, UpsertResponse)>>,
    write_ids: Mutex<Vec<Uuid>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    upsert_calls: AtomicUsize,
    retrieve_calls: AtomicUsize,
    next_server_id: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seeds an object into the remote store as-is
    pub fn seed(&self, object: CatalogObject) {
        self.store
            .lock()
            .unwrap()
            .insert(object.id().clone(), object);
    }

    pub fn stored(&self, id: &str) -> Option<CatalogObject> {
        self.store.lock().unwrap().get(&oid(id)).cloned()
    }

    /// Makes upsert call number `call` fail with `error`
    pub fn fail_call(&self, call: usize, error: CatalogError) {
        self.scripted.lock().unwrap().insert(call, error);
    }

    /// Rejects any batch containing an object matching `predicate`, naming
    /// the matching objects
    pub fn reject_objects(&self, predicate: impl Fn(&CatalogObject) -> bool + Send + Sync + 'static) {
        *self.reject.lock().unwrap() = Some(Box::new(predicate));
    }

    /// Cancels `token` as soon as an upsert arrives
    pub fn cancel_on_upsert(&self, token: CancellationToken) {
        *self.cancel_on_upsert.lock().unwrap() = Some(token);
    }

    /// Makes every upsert take `latency` before answering
    pub fn respond_after(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Highest number of upserts that were in progress at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Write ids of all upsert calls, in call order
    pub fn write_ids(&self) -> Vec<Uuid> {
        self.write_ids.lock().unwrap().clone()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }
}

impl FakeCatalog {
    fn write(
        &self,
        call: usize,
        objects: &[CatalogObject],
        write_id: Uuid,
    ) -> Result<UpsertResponse, CatalogError> {
        if let Some(token) = self.cancel_on_upsert.lock().unwrap().as_ref() {
            token.cancel();
        }
        if let Some(error) = self.scripted.lock().unwrap().remove(&call) {
            return Err(error);
        }
        if let Some((request, response)) = self.replays.lock().unwrap().get(&write_id) {
            if request.as_slice() == objects {
                return Ok(response.clone());
            }
        }

        if let Some(reject) = self.reject.lock().unwrap().as_ref() {
            let rejected: Vec<RemoteErrorDetail> = objects
                .iter()
                .filter(|o| reject(*o))
                .map(|o| {
                    RemoteErrorDetail::new(ErrorCode::InvalidValue, "invalid price")
                        .for_object(o.id().clone())
                })
                .collect();
            if !rejected.is_empty() {
                return Err(CatalogError::remote(Some(400), rejected));
            }
        }

        let mut store = self.store.lock().unwrap();

        let stale: Vec<RemoteErrorDetail> = objects
            .iter()
            .filter(|o| o.id().is_stable())
            .filter_map(|o| {
                let current = store.get(o.id())?;
                (o.version() != current.version()).then(|| {
                    RemoteErrorDetail::new(
                        ErrorCode::VersionMismatch,
                        format!("object {} version mismatch", o.id()),
                    )
                    .for_object(o.id().clone())
                })
            })
            .collect();
        if !stale.is_empty() {
            return Err(CatalogError::remote(Some(400), stale));
        }

        let mut response = UpsertResponse::default();
        for object in objects {
            let mut written = object.clone();
            if object.id().is_placeholder() {
                let n = self.next_server_id.fetch_add(1, Ordering::SeqCst) + 1;
                let server_id = oid(&format!("SRV-{n}"));
                response.id_mappings.push(IdMapping {
                    client_object_id: object.id().clone(),
                    object_id: server_id.clone(),
                });
                written.set_id(server_id);
            }
            let next_version = store
                .get(written.id())
                .and_then(|o| o.version())
                .unwrap_or(0)
                + 1;
            written.set_version(Some(next_version));
            written.set_updated_at(Some(Utc::now()));
            store.insert(written.id().clone(), written.clone());
            response.objects.push(written);
        }
        self.replays
            .lock()
            .unwrap()
            .insert(write_id, (objects.to_vec(), response.clone()));
        Ok(response)
    }
}

#[async_trait]
impl ICatalogService for FakeCatalog {
    async fn batch_upsert(
        &self,
        _tenant: &TenantId,
        objects: &[CatalogObject],
        write_id: Uuid,
    ) -> Result<UpsertResponse, CatalogError> {
        let call = self.upsert_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.write_ids.lock().unwrap().push(write_id);

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.write(call, objects, write_id);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn batch_retrieve(
        &self,
        _tenant: &TenantId,
        ids: &[ObjectId],
    ) -> Result<Vec<CatalogObject>, CatalogError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        let store = self.store.lock().unwrap();
        Ok(ids.iter().filter_map(|id| store.get(id).cloned()).collect())
    }
}

pub fn oid(s: &str) -> ObjectId {
    ObjectId::new(s).unwrap()
}

pub fn tenant() -> TenantId {
    TenantId::new("merchant-1").unwrap()
}

pub fn item(id: &str) -> CatalogObject {
    CatalogObject::new(oid(id), ObjectType::Item)
}

pub fn new_items(count: usize) -> Vec<CatalogObject> {
    (0..count)
        .map(|i| item(&format!("#item-{i}")).with_field("name", format!("Item {i}")))
        .collect()
}

/// Short, jitter-free delays so paused-time tests stay deterministic
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_base_delay(Duration::from_millis(10))
        .with_jitter(0.0)
}

pub fn server_error() -> CatalogError {
    CatalogError::remote(
        Some(500),
        vec![RemoteErrorDetail::new(
            ErrorCode::InternalServerError,
            "internal error",
        )],
    )
}

pub fn synchronizer(fake: &Arc<FakeCatalog>) -> BatchSynchronizer {
    let service: Arc<dyn ICatalogService> = fake.clone();
    BatchSynchronizer::new(service, OptimizerConfig::default())
}
