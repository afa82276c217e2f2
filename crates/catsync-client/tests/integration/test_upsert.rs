//! Batch upsert request shape and response decoding

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

use catsync_core::domain::{CatalogObject, ObjectType};
use catsync_core::ports::ICatalogService;

use crate::common::{oid, setup_catalog_mock, tenant, TOKEN};

#[tokio::test]
async fn test_batch_upsert_sends_objects_and_decodes_mappings() {
    let (server, client) = setup_catalog_mock().await;

    Mock::given(method("POST"))
        .and(path("/v2/catalog/batch-upsert"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(header("Square-Version", "2024-01-18"))
        .and(body_partial_json(json!({
            "batches": [{
                "objects": [
                    {"type": "ITEM", "id": "#mug", "item_data": {"name": "Mug"}},
                    {"type": "CATEGORY", "id": "CAT-1", "version": 4, "category_data": {"name": "Kitchen"}}
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objects": [
                {
                    "type": "ITEM",
                    "id": "W62UWFY35CWMYGVWK6TWJDNI",
                    "version": 1706000000001_i64,
                    "updated_at": "2024-01-23T09:00:00.000Z",
                    "item_data": {"name": "Mug"}
                },
                {
                    "type": "CATEGORY",
                    "id": "CAT-1",
                    "version": 1706000000002_i64,
                    "category_data": {"name": "Kitchen"}
                }
            ],
            "id_mappings": [
                {"client_object_id": "#mug", "object_id": "W62UWFY35CWMYGVWK6TWJDNI"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let objects = vec![
        CatalogObject::new(oid("#mug"), ObjectType::Item).with_field("name", "Mug"),
        CatalogObject::new(oid("CAT-1"), ObjectType::Category)
            .with_version(4)
            .with_field("name", "Kitchen"),
    ];

    let response = client
        .batch_upsert(&tenant(), &objects, Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(response.objects.len(), 2);
    assert_eq!(
        response.resolve_id(&oid("#mug")).as_str(),
        "W62UWFY35CWMYGVWK6TWJDNI"
    );
    assert_eq!(
        response.written_object(&oid("#mug")).unwrap().version(),
        Some(1_706_000_000_001)
    );
    assert_eq!(
        response.written_object(&oid("CAT-1")).unwrap().version(),
        Some(1_706_000_000_002)
    );
}

#[tokio::test]
async fn test_resend_reuses_key_and_new_write_does_not() {
    let (server, client) = setup_catalog_mock().await;

    Mock::given(method("POST"))
        .and(path("/v2/catalog/batch-upsert"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"objects": []})))
        .mount(&server)
        .await;

    let objects = vec![CatalogObject::new(oid("ITEM-1"), ObjectType::Item)
        .with_version(1)
        .with_field("name", "Mug")];
    let write = Uuid::new_v4();
    client.batch_upsert(&tenant(), &objects, write).await.unwrap();
    client.batch_upsert(&tenant(), &objects, write).await.unwrap();
    client
        .batch_upsert(&tenant(), &objects, Uuid::new_v4())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    let keys: Vec<String> = requests
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["idempotency_key"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(keys[0], keys[1]);
    assert_ne!(keys[0], keys[2]);
    assert_eq!(keys[0].len(), 64);
}
