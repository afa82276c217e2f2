//! Cancellation between batches and between attempts

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use catsync_conflict::ErrorClass;
use catsync_sync::{ObjectOutcome, SyncOptions};

use crate::common::*;

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_new_batches() {
    let fake = FakeCatalog::new();
    let cancel = CancellationToken::new();
    fake.cancel_on_upsert(cancel.clone());
    let sync = synchronizer(&fake);

    let options = SyncOptions::default()
        .with_batch_size(10)
        .with_concurrency(1)
        .with_inter_batch_delay(Duration::ZERO)
        .with_cancel(cancel);
    let report = sync
        .synchronize_with(new_items(30), &tenant(), &fast_policy(), options)
        .await
        .unwrap();

    // The in-flight batch completes, the rest never start
    assert!(report.cancelled);
    assert_eq!(report.batches, 1);
    assert_eq!(report.succeeded, 10);
    assert_eq!(report.not_attempted, 20);
    assert_eq!(fake.upsert_calls(), 1);
    assert_eq!(
        report.outcome(&oid("#item-29")),
        Some(&ObjectOutcome::NotAttempted)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_writes_nothing() {
    let fake = FakeCatalog::new();
    let sync = synchronizer(&fake);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = sync
        .synchronize_with(
            new_items(5),
            &tenant(),
            &fast_policy(),
            SyncOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.not_attempted, 5);
    assert_eq!(report.batches, 0);
    assert_eq!(fake.upsert_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_retry_backoff() {
    let fake = FakeCatalog::new();
    fake.fail_call(1, server_error());
    let cancel = CancellationToken::new();
    fake.cancel_on_upsert(cancel.clone());
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize_with(
            new_items(3),
            &tenant(),
            &fast_policy(),
            SyncOptions::default().with_cancel(cancel),
        )
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.failed, 3);
    assert_eq!(fake.upsert_calls(), 1);
    match report.outcome(&oid("#item-0")) {
        Some(ObjectOutcome::Failed {
            class,
            attempts,
            message,
        }) => {
            assert_eq!(*class, ErrorClass::Retryable);
            assert_eq!(*attempts, 1);
            assert!(message.contains("cancelled"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}
