//! Version conflict recovery

use std::sync::Arc;

use serde_json::json;

use catsync_conflict::Reconciler;
use catsync_sync::{ObjectOutcome, SyncOptions};

use crate::common::*;

/// Remote holds v5 with extra fields, the local copy is v4 with a new name
fn seed_conflict(fake: &Arc<FakeCatalog>) {
    fake.seed(
        item("ITEM-A")
            .with_version(5)
            .with_field("name", "Old name")
            .with_field("description", "Stoneware mug")
            .with_field("category_id", "CAT-1"),
    );
    fake.seed(item("ITEM-B").with_version(2).with_field("name", "Plate"));
}

fn local_objects() -> Vec<catsync_core::domain::CatalogObject> {
    vec![
        item("ITEM-A")
            .with_version(4)
            .with_field("name", "New name")
            .with_field("description", "Hand-thrown stoneware mug"),
        item("ITEM-B").with_version(2).with_field("name", "Dinner plate"),
        item("#bowl").with_field("name", "Bowl"),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_stale_version_is_reconciled_and_written() {
    let fake = FakeCatalog::new();
    seed_conflict(&fake);
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize(local_objects(), &tenant(), &fast_policy())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.conflicts_recovered, 1);
    assert_eq!(report.write_attempts, 2);
    assert_eq!(fake.upsert_calls(), 2);
    assert_eq!(fake.retrieve_calls(), 1);

    assert_eq!(
        report.outcome(&oid("ITEM-A")),
        Some(&ObjectOutcome::Succeeded {
            id: oid("ITEM-A"),
            version: Some(6),
            recovered_conflict: true,
        })
    );
    assert!(matches!(
        report.outcome(&oid("ITEM-B")),
        Some(ObjectOutcome::Succeeded {
            recovered_conflict: false,
            ..
        })
    ));
    assert!(matches!(
        report.outcome(&oid("#bowl")),
        Some(ObjectOutcome::Succeeded { id, .. }) if id.as_str().starts_with("SRV-")
    ));

    // Local fields win, remote-only fields survive
    let stored = fake.stored("ITEM-A").unwrap();
    assert_eq!(stored.version(), Some(6));
    assert_eq!(stored.field("name"), Some(&json!("New name")));
    assert_eq!(
        stored.field("description"),
        Some(&json!("Hand-thrown stoneware mug"))
    );
    assert_eq!(stored.field("category_id"), Some(&json!("CAT-1")));

    assert_eq!(sync.version_cache().get_version(&oid("ITEM-A")), Some(6));
}

#[tokio::test(start_paused = true)]
async fn test_remote_wins_strategy_keeps_remote_fields() {
    let fake = FakeCatalog::new();
    seed_conflict(&fake);
    let sync = synchronizer(&fake).with_reconciler(Reconciler::from_name("remote_wins").unwrap());

    let report = sync
        .synchronize(local_objects(), &tenant(), &fast_policy())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 3);
    let stored = fake.stored("ITEM-A").unwrap();
    assert_eq!(stored.field("name"), Some(&json!("Old name")));
    assert_eq!(stored.field("description"), Some(&json!("Stoneware mug")));
    assert_eq!(stored.version(), Some(6));
}

#[tokio::test(start_paused = true)]
async fn test_unversioned_object_adopts_remote_version_before_writing() {
    let fake = FakeCatalog::new();
    fake.seed(
        item("ITEM-X")
            .with_version(3)
            .with_field("name", "Cup")
            .with_field("image_ids", json!(["IMG-1"])),
    );
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize(
            vec![item("ITEM-X").with_field("name", "Tea cup")],
            &tenant(),
            &fast_policy(),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.write_attempts, 1);
    assert_eq!(report.conflicts_recovered, 0);
    assert_eq!(fake.retrieve_calls(), 1);

    let stored = fake.stored("ITEM-X").unwrap();
    assert_eq!(stored.version(), Some(4));
    assert_eq!(stored.field("name"), Some(&json!("Tea cup")));
    assert_eq!(stored.field("image_ids"), Some(&json!(["IMG-1"])));

    // Second run is served from the version cache
    let report = sync
        .synchronize(
            vec![item("ITEM-X").with_field("name", "Large tea cup")],
            &tenant(),
            &fast_policy(),
        )
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.write_attempts, 1);
    assert_eq!(fake.retrieve_calls(), 1);
    assert_eq!(fake.stored("ITEM-X").unwrap().version(), Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_conflicts_are_isolated_to_their_batch() {
    let fake = FakeCatalog::new();
    seed_conflict(&fake);
    let sync = synchronizer(&fake);

    let options = SyncOptions::default()
        .with_batch_size(1)
        .with_concurrency(1)
        .with_inter_batch_delay(std::time::Duration::ZERO);
    let report = sync
        .synchronize_with(local_objects(), &tenant(), &fast_policy(), options)
        .await
        .unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.conflicts_recovered, 1);
    // One extra attempt, only for the conflicting batch
    assert_eq!(report.write_attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_run_is_checked_against_current_versions() {
    let fake = FakeCatalog::new();
    fake.seed(item("ITEM-A").with_version(3).with_field("name", "Mug"));
    let sync = synchronizer(&fake);
    let desired = vec![item("ITEM-A").with_version(3).with_field("name", "Large mug")];

    let first = sync
        .synchronize(desired.clone(), &tenant(), &fast_policy())
        .await
        .unwrap();
    assert!(matches!(
        first.outcome(&oid("ITEM-A")),
        Some(ObjectOutcome::Succeeded { version: Some(4), .. })
    ));

    // Another writer moves the object on before the same file is sent again
    fake.seed(item("ITEM-A").with_version(5).with_field("name", "Espresso cup"));

    let second = sync
        .synchronize(desired, &tenant(), &fast_policy())
        .await
        .unwrap();

    assert_eq!(
        second.outcome(&oid("ITEM-A")),
        Some(&ObjectOutcome::Succeeded {
            id: oid("ITEM-A"),
            version: Some(6),
            recovered_conflict: true,
        })
    );
    let stored = fake.stored("ITEM-A").unwrap();
    assert_eq!(stored.version(), Some(6));
    assert_eq!(stored.field("name"), Some(&json!("Large mug")));

    // Both attempts of the second run share a write id the first run never used
    let write_ids = fake.write_ids();
    assert_eq!(write_ids.len(), 3);
    assert_eq!(write_ids[1], write_ids[2]);
    assert_ne!(write_ids[0], write_ids[1]);
}

#[tokio::test(start_paused = true)]
async fn test_resend_after_failure_keeps_write_id() {
    let fake = FakeCatalog::new();
    fake.fail_call(1, server_error());
    let sync = synchronizer(&fake);

    let report = sync
        .synchronize(new_items(3), &tenant(), &fast_policy())
        .await
        .unwrap();

    assert_eq!(report.succeeded, 3);
    assert_eq!(report.write_attempts, 2);
    let write_ids = fake.write_ids();
    assert_eq!(write_ids.len(), 2);
    assert_eq!(write_ids[0], write_ids[1]);
}
