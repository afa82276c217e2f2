//! Partitioning, failure isolation and optimizer feedback

use std::time::Duration;

use serde_json::{json, Value};

use catsync_core::domain::DomainError;
use catsync_core::ports::{CatalogError, ErrorCode, RemoteErrorDetail};
use catsync_conflict::ErrorClass;
use catsync_sync::{ObjectOutcome, PerformanceTier, SyncError, SyncOptions};

use crate::common::*;

fn sequential(batch_size: usize) -> SyncOptions {
    SyncOptions::default()
        .with_batch_size(batch_size)
        .with_concurrency(1)
        .with_inter_batch_delay(Duration::ZERO)
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_within_their_batch() {
    let fake = FakeCatalog::new();
    // Third batch fails twice before succeeding
    fake.fail_call(3, server_error());
    fake.fail_call(4, server_error());
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize_with(new_items(50), &tenant(), &fast_policy(), sequential(10))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded, 50);
    assert_eq!(report.batches, 5);
    assert_eq!(report.write_attempts, 7);
    assert!(report.objects.iter().all(|o| matches!(
        &o.outcome,
        ObjectOutcome::Succeeded { id, version: Some(1), .. } if id.as_str().starts_with("SRV-")
    )));

    let profile = sync.optimizer().profile(&tenant()).unwrap();
    assert_eq!(profile.total_requests, 7);
    assert_eq!(profile.successful_requests, 5);
    assert_eq!(profile.failed_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_follow_input_order() {
    let fake = FakeCatalog::new();
    let sync = synchronizer(&fake);
    let objects = new_items(25);
    let expected: Vec<String> = objects.iter().map(|o| o.id().to_string()).collect();

    let options = SyncOptions::default()
        .with_batch_size(4)
        .with_concurrency(3)
        .with_inter_batch_delay(Duration::ZERO);
    let report = sync
        .synchronize_with(objects, &tenant(), &fast_policy(), options)
        .await
        .unwrap();

    let actual: Vec<String> = report
        .objects
        .iter()
        .map(|o| o.requested_id.to_string())
        .collect();
    assert_eq!(actual, expected);
    assert_eq!(report.batches, 7);
    assert_eq!(report.succeeded, 25);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_batches_never_exceed_concurrency() {
    let fake = FakeCatalog::new();
    fake.respond_after(Duration::from_millis(50));
    let sync = synchronizer(&fake);

    let options = SyncOptions::default()
        .with_batch_size(2)
        .with_concurrency(2)
        .with_inter_batch_delay(Duration::ZERO);
    let report = sync
        .synchronize_with(new_items(12), &tenant(), &fast_policy(), options)
        .await
        .unwrap();

    assert_eq!(report.batches, 6);
    assert_eq!(report.succeeded, 12);
    assert_eq!(fake.upsert_calls(), 6);
    assert_eq!(fake.max_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_one_never_overlaps_batches() {
    let fake = FakeCatalog::new();
    fake.respond_after(Duration::from_millis(50));
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize_with(new_items(12), &tenant(), &fast_policy(), sequential(2))
        .await
        .unwrap();

    assert_eq!(report.batches, 6);
    assert_eq!(report.succeeded, 12);
    assert_eq!(fake.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_object_does_not_block_its_siblings() {
    let fake = FakeCatalog::new();
    fake.reject_objects(|o| o.field("price").and_then(Value::as_i64).map_or(false, |p| p < 0));
    let sync = synchronizer(&fake);

    let objects: Vec<_> = new_items(6)
        .into_iter()
        .enumerate()
        .map(|(i, o)| o.with_field("price", if i == 1 { json!(-1) } else { json!(500) }))
        .collect();
    let options = SyncOptions::default()
        .with_batch_size(3)
        .with_concurrency(2)
        .with_inter_batch_delay(Duration::ZERO);

    let report = sync
        .synchronize_with(objects, &tenant(), &fast_policy(), options)
        .await
        .unwrap();

    assert_eq!(report.succeeded, 5);
    assert_eq!(report.failed, 1);
    assert_eq!(report.write_attempts, 3);
    match report.outcome(&oid("#item-1")) {
        Some(ObjectOutcome::Failed {
            class, attempts, ..
        }) => {
            assert_eq!(*class, ErrorClass::Fatal);
            assert_eq!(*attempts, 1);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(report.outcome(&oid("#item-0")).unwrap().is_success());
    assert!(report.outcome(&oid("#item-2")).unwrap().is_success());
}

#[tokio::test(start_paused = true)]
async fn test_batch_wide_fatal_error_fails_only_that_batch() {
    let fake = FakeCatalog::new();
    fake.fail_call(
        1,
        CatalogError::remote(
            Some(401),
            vec![RemoteErrorDetail::new(ErrorCode::Unauthorized, "bad token")],
        ),
    );
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize_with(new_items(6), &tenant(), &fast_policy(), sequential(3))
        .await
        .unwrap();

    assert_eq!(report.failed, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.write_attempts, 2);
    let failed: Vec<String> = report.failures().map(|o| o.requested_id.to_string()).collect();
    assert_eq!(failed, vec!["#item-0", "#item-1", "#item-2"]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_are_reported() {
    let fake = FakeCatalog::new();
    for call in 1..=3 {
        fake.fail_call(call, server_error());
    }
    let sync = synchronizer(&fake);
    let policy = fast_policy().with_max_attempts(3);

    let report = sync
        .synchronize_with(new_items(3), &tenant(), &policy, sequential(10))
        .await
        .unwrap();

    assert_eq!(report.failed, 3);
    assert_eq!(fake.upsert_calls(), 3);
    for object in &report.objects {
        match &object.outcome {
            ObjectOutcome::Failed {
                class,
                attempts,
                message,
            } => {
                assert_eq!(*class, ErrorClass::Retryable);
                assert_eq!(*attempts, 3);
                assert!(message.contains("retries exhausted"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_honours_retry_after_and_degrades_tenant() {
    let fake = FakeCatalog::new();
    fake.fail_call(
        1,
        CatalogError::Remote {
            status: Some(429),
            errors: vec![RemoteErrorDetail::new(ErrorCode::RateLimited, "slow down")],
            retry_after: Some(Duration::from_secs(30)),
        },
    );
    let sync = synchronizer(&fake);

    let started = tokio::time::Instant::now();
    let report = sync
        .synchronize_with(new_items(5), &tenant(), &fast_policy(), sequential(10))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(report.succeeded, 5);
    assert_eq!(report.write_attempts, 2);

    let config = sync.get_batch_config(&tenant());
    assert_eq!(config.tier, PerformanceTier::Degraded);
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.concurrency, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_uses_default_batch_size() {
    let fake = FakeCatalog::new();
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize(new_items(150), &tenant(), &fast_policy())
        .await
        .unwrap();

    assert_eq!(report.batches, 2);
    assert_eq!(report.succeeded, 150);
    assert_eq!(fake.upsert_calls(), 2);
}

#[tokio::test]
async fn test_duplicate_ids_are_rejected_before_any_write() {
    let fake = FakeCatalog::new();
    let sync = synchronizer(&fake);
    let objects = vec![item("ITEM-1"), item("ITEM-2"), item("ITEM-1")];

    let result = sync.synchronize(objects, &tenant(), &fast_policy()).await;

    assert!(matches!(
        result,
        Err(SyncError::InvalidInput(DomainError::DuplicateObjectId(ref id))) if id == "ITEM-1"
    ));
    assert_eq!(fake.upsert_calls(), 0);
    assert_eq!(fake.retrieve_calls(), 0);
}

#[tokio::test]
async fn test_zero_batch_size_is_invalid() {
    let fake = FakeCatalog::new();
    let sync = synchronizer(&fake);

    let result = sync
        .synchronize_with(
            new_items(3),
            &tenant(),
            &fast_policy(),
            SyncOptions::default().with_batch_size(0),
        )
        .await;

    assert!(matches!(result, Err(SyncError::InvalidOptions(_))));
    assert_eq!(fake.upsert_calls(), 0);
}

#[tokio::test]
async fn test_empty_input_produces_empty_report() {
    let fake = FakeCatalog::new();
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize(Vec::new(), &tenant(), &fast_policy())
        .await
        .unwrap();

    assert!(report.objects.is_empty());
    assert!(report.is_success());
    assert_eq!(report.batches, 0);
    assert_eq!(fake.upsert_calls(), 0);
}
