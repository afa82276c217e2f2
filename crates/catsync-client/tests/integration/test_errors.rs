//! Error mapping: structured rejections, throttling and transport faults

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catsync_client::{CatalogClient, ClientConfig};
use catsync_core::config::ServiceConfig;
use catsync_core::domain::{CatalogObject, ObjectType, TenantId};
use catsync_core::ports::{CatalogError, ErrorCode, ICatalogService, TransportFault};

use crate::common::{impatient_client, oid, setup_catalog_mock, tenant};

fn objects() -> Vec<CatalogObject> {
    vec![
        CatalogObject::new(oid("ITEM-1"), ObjectType::Item).with_version(4),
        CatalogObject::new(oid("#new"), ObjectType::Item),
    ]
}

async fn mount_upsert(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/v2/catalog/batch-upsert"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_version_mismatch_is_a_remote_error() {
    let (server, client) = setup_catalog_mock().await;
    mount_upsert(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{
                "category": "INVALID_REQUEST_ERROR",
                "code": "VERSION_MISMATCH",
                "detail": "Object `ITEM-1` of type ITEM at version 4 does not match the current version 5",
                "field": "version"
            }]
        })),
    )
    .await;

    let err = client
        .batch_upsert(&tenant(), &objects(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert_eq!(err.primary_code(), Some(&ErrorCode::VersionMismatch));
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let (server, client) = setup_catalog_mock().await;
    mount_upsert(
        &server,
        ResponseTemplate::new(429)
            .insert_header("Retry-After", "7")
            .set_body_json(json!({
                "errors": [{"category": "RATE_LIMIT_ERROR", "code": "RATE_LIMITED", "detail": "slow down"}]
            })),
    )
    .await;

    let err = client
        .batch_upsert(&tenant(), &objects(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_indexed_field_names_the_offending_object() {
    let (server, client) = setup_catalog_mock().await;
    mount_upsert(
        &server,
        ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{
                "category": "INVALID_REQUEST_ERROR",
                "code": "INVALID_VALUE",
                "detail": "name must not be empty",
                "field": "batches[0].objects[1].item_data.name"
            }]
        })),
    )
    .await;

    let err = client
        .batch_upsert(&tenant(), &objects(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(err.primary_code(), Some(&ErrorCode::InvalidValue));
    assert_eq!(err.offending_object_ids(), vec![oid("#new")]);
}

#[tokio::test]
async fn test_unstructured_server_error_keeps_status() {
    let (server, client) = setup_catalog_mock().await;
    mount_upsert(
        &server,
        ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"),
    )
    .await;

    let err = client
        .batch_upsert(&tenant(), &objects(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(502));
    assert!(err.codes().is_empty());
    assert_eq!(err.retry_after(), None);
}

#[tokio::test]
async fn test_malformed_success_body_is_invalid_response() {
    let (server, client) = setup_catalog_mock().await;
    mount_upsert(&server, ResponseTemplate::new(200).set_body_string("not json")).await;

    let err = client
        .batch_upsert(&tenant(), &objects(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unknown_tenant_sends_nothing() {
    let (server, client) = setup_catalog_mock().await;
    let stranger = TenantId::new("merchant-2").unwrap();

    let err = client
        .batch_upsert(&stranger, &objects(), Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(err, CatalogError::MissingCredentials(stranger));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    mount_upsert(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"objects": []}))
            .set_delay(Duration::from_secs(2)),
    )
    .await;
    let client = impatient_client(&server);

    let err = client
        .batch_upsert(&tenant(), &objects(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.transport_fault(), Some(TransportFault::Timeout));
}

#[tokio::test]
async fn test_unreachable_service_is_a_transport_error() {
    let config = ClientConfig::from_service(&ServiceConfig::default())
        .with_base_url("http://127.0.0.1:1")
        .with_token(tenant(), "token");
    let client = CatalogClient::new(config).unwrap();

    let err = client
        .batch_retrieve(&tenant(), &[oid("ITEM-1")])
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Transport { .. }));
}
