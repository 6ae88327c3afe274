//! Integration tests for HTTP API endpoints.

mod common;

use axum::body::Body;
use axum::http::StatusCode;
use common::{TestServer, doc, fields, seed_wave};
use serde_json::json;
use tally_core::Fields;
use tally_store::DocumentStore;
use tally_sync::JobKind;

fn count(data: &Fields, name: &str) -> i64 {
    data["counts"][name].as_i64().unwrap()
}

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;
    let (status, body) = server.request("GET", "/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "sqlite");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    tally_server::metrics::register_metrics();
    let server = TestServer::new().await;
    seed_wave(server.store().as_ref(), "waves/w1", 0).await;
    server
        .request(
            "POST",
            "/v1/events/child-created",
            Some(json!({"parent": "waves/w1", "child_collection": "splashes"})),
        )
        .await;

    let (status, body) = server.request("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("tally_counter_events_total"));
}

#[tokio::test]
async fn test_metrics_endpoint_disabled() {
    let server = TestServer::with_config(|c| c.server.metrics_enabled = false).await;
    let (status, _) = server.request("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Trigger events
// =============================================================================

#[tokio::test]
async fn test_child_events_adjust_counter() {
    let server = TestServer::new().await;
    let wave = seed_wave(server.store().as_ref(), "waves/w1", 0).await;
    let event = json!({"parent": "waves/w1", "child_collection": "splashes", "child_id": "s1"});

    for expected in 1..=3 {
        let (status, body) = server
            .request("POST", "/v1/events/child-created", Some(event.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], true);
        assert_eq!(body["counter"], "splashes");
        assert_eq!(body["value"], expected);
    }

    let (status, body) = server
        .request("POST", "/v1/events/child-deleted", Some(event))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 2);

    let data = server.store().get(&wave).await.unwrap().unwrap();
    assert_eq!(count(&data, "splashes"), 2);
}

#[tokio::test]
async fn test_child_deleted_floors_at_zero() {
    let server = TestServer::new().await;
    let wave = seed_wave(server.store().as_ref(), "waves/w1", 0).await;

    let (status, body) = server
        .request(
            "POST",
            "/v1/events/child-deleted",
            Some(json!({"parent": "waves/w1", "child_collection": "echoes"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["value"], 0);

    let data = server.store().get(&wave).await.unwrap().unwrap();
    assert_eq!(count(&data, "echoes"), 0);
}

#[tokio::test]
async fn test_unmapped_child_collection_is_ignored() {
    let server = TestServer::new().await;
    let wave = seed_wave(server.store().as_ref(), "waves/w1", 0).await;
    let before = server.store().get(&wave).await.unwrap();

    let (status, body) = server
        .request(
            "POST",
            "/v1/events/child-created",
            Some(json!({"parent": "waves/w1", "child_collection": "comments"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
    assert_eq!(body["outcome"], "unmapped");
    assert!(body["counter"].is_null());
    assert_eq!(server.store().get(&wave).await.unwrap(), before);
}

#[tokio::test]
async fn test_missing_parent_is_not_applied() {
    let server = TestServer::new().await;
    let (status, body) = server
        .request(
            "POST",
            "/v1/events/child-created",
            Some(json!({"parent": "waves/gone", "child_collection": "splashes"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], false);
    assert_eq!(body["outcome"], "parent_missing");
    assert_eq!(body["counter"], "splashes");
    assert!(server.store().get(&doc("waves/gone")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_events_rejected() {
    let server = TestServer::new().await;

    // Collection path where a document path is expected.
    let (status, body) = server
        .request(
            "POST",
            "/v1/events/child-created",
            Some(json!({"parent": "waves", "child_collection": "splashes"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    // Child collection that is not a single segment.
    let (status, body) = server
        .request(
            "POST",
            "/v1/events/child-created",
            Some(json!({"parent": "waves/w1", "child_collection": "a/b"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _) = server
        .raw_request("POST", "/v1/events/child-deleted", Body::from("{not json"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Jobs
// =============================================================================

#[tokio::test]
async fn test_migrate_usernames_dry_run_then_apply() {
    let server = TestServer::new().await;
    let store = server.store();
    store
        .set(&doc("users/a"), fields(json!({"username": "@Alice"})))
        .await
        .unwrap();
    store
        .set(
            &doc("users/b"),
            fields(json!({"username": "bob", "username_lc": "bob"})),
        )
        .await
        .unwrap();

    let (status, body) = server
        .request(
            "POST",
            "/v1/admin/jobs/migrate-usernames",
            Some(json!({"dry_run": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"], "migrate_usernames");
    assert_eq!(body["dryRun"], true);
    assert_eq!(body["totalScanned"], 2);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["skipped"], 1);
    let alice = store.get(&doc("users/a")).await.unwrap().unwrap();
    assert!(!alice.contains_key("username_lc"));

    // Empty body runs with configured defaults.
    let (status, body) = server
        .request("POST", "/v1/admin/jobs/migrate-usernames", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dryRun"], false);
    assert_eq!(body["updated"], 1);
    assert_eq!(body["failed"], json!([]));
    let alice = store.get(&doc("users/a")).await.unwrap().unwrap();
    assert_eq!(alice["username_lc"], "alice");
    assert_eq!(alice["username"], "@Alice");
}

#[tokio::test]
async fn test_migrate_usernames_rejects_bad_collection() {
    let server = TestServer::new().await;
    let (status, body) = server
        .request(
            "POST",
            "/v1/admin/jobs/migrate-usernames",
            Some(json!({"collection": "users/u1"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_reset_counts_zeroes_and_purges() {
    let server = TestServer::new().await;
    let store = server.store();
    let wave = seed_wave(store.as_ref(), "waves/w1", 3).await;

    let (status, body) = server
        .request(
            "POST",
            "/v1/admin/jobs/reset-counts",
            Some(json!({"collections": ["waves"]})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["job"], "reset_counts");
    assert_eq!(body["updated"], 1);
    assert_eq!(body["deleted"], 3);

    let data = store.get(&wave).await.unwrap().unwrap();
    assert_eq!(count(&data, "splashes"), 0);
    assert!(
        store
            .get(&doc("waves/w1/splashes/s0"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_reset_counts_unknown_collection() {
    let server = TestServer::new().await;
    let (status, body) = server
        .request(
            "POST",
            "/v1/admin/jobs/reset-counts",
            Some(json!({"collections": ["nope"]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_concurrent_job_of_same_kind_conflicts() {
    let server = TestServer::new().await;
    let _guard = server.state.jobs.try_acquire(JobKind::ResetCounts).unwrap();

    let (status, body) = server
        .request("POST", "/v1/admin/jobs/reset-counts", None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    // A different kind is unaffected.
    let (status, _) = server
        .request("POST", "/v1/admin/jobs/migrate-usernames", None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_job_request_rejects_unknown_fields() {
    let server = TestServer::new().await;
    let (status, _) = server
        .request(
            "POST",
            "/v1/admin/jobs/reset-counts",
            Some(json!({"colections": ["waves"]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
