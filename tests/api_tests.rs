//! Router-level tests. The cluster pools are built lazily, so everything
//! exercised here stops before the first real database round-trip.

mod common;

use axum_test::TestServer;
use common::{create_test_app, create_test_state};
use http::StatusCode;
use serde_json::json;
use uuid::Uuid;

fn server() -> TestServer {
    TestServer::new(create_test_app(create_test_state())).expect("test server")
}

#[tokio::test]
async fn health_reports_ok_without_a_database() {
    let server = server();
    let response = server.get("/api/health").await;
    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn stats_snapshot_includes_every_component() {
    let server = server();
    let response = server.get("/api/stats").await;
    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert!(body["cluster"]["master_active"].is_boolean());
    assert_eq!(body["read_breaker"]["state"], "CLOSED");
    assert!(body["fallback"]["cache_size"].is_number());
}

#[tokio::test]
async fn breakers_can_be_forced_by_name() {
    let server = server();

    let listing = server.get("/api/breakers").await;
    listing.assert_status(StatusCode::OK);
    let body: serde_json::Value = listing.json();
    assert_eq!(body[0]["name"], "ledger-reads");

    let forced = server.post("/api/breakers/ledger-reads/force_open").await;
    forced.assert_status(StatusCode::OK);
    let forced_body: serde_json::Value = forced.json();
    assert_eq!(forced_body["state"], "OPEN");

    let reset = server.post("/api/breakers/ledger-reads/reset").await;
    reset.assert_status(StatusCode::OK);
    let reset_body: serde_json::Value = reset.json();
    assert_eq!(reset_body["state"], "CLOSED");

    let unknown = server.post("/api/breakers/nope/reset").await;
    unknown.assert_status(StatusCode::NOT_FOUND);

    let bad_action = server.post("/api/breakers/ledger-reads/explode").await;
    bad_action.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let server = server();
    let response = server.get("/api-docs/openapi.json").await;
    response.assert_status(StatusCode::OK);

    let body: serde_json::Value = response.json();
    assert!(body["paths"]["/api/transactions/transfer"].is_object());
}

#[tokio::test]
async fn unsupported_currency_is_rejected_before_any_io() {
    let server = server();
    let response = server
        .post("/api/transactions/credit")
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "currency": "JPY",
            "amount": "10.00"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("currency not supported"));
}

#[tokio::test]
async fn zero_amount_is_invalid() {
    let server = server();
    let response = server
        .post("/api/transactions/debit")
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "currency": "USD",
            "amount": "0"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overscaled_amount_is_invalid() {
    let server = server();
    let response = server
        .post("/api/transactions/credit")
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "currency": "USD",
            "amount": "1.00001"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn self_transfer_in_one_currency_is_rejected() {
    let server = server();
    let user = Uuid::new_v4();
    let response = server
        .post("/api/transactions/transfer")
        .json(&json!({
            "from_user_id": user,
            "to_user_id": user,
            "currency": "USD",
            "amount": "5.00"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let server = server();
    let response = server
        .post("/api/batches")
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "kind": "CREDIT",
            "currency": "USD",
            "items": []
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_batch_is_rejected() {
    let server = server();
    let items: Vec<_> = (0..1001).map(|_| json!({ "amount": "1.00" })).collect();
    let response = server
        .post("/api/batches")
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "kind": "CREDIT",
            "currency": "USD",
            "items": items
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn past_schedule_time_is_rejected() {
    let server = server();
    let response = server
        .post("/api/scheduled")
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "kind": "CREDIT",
            "currency": "USD",
            "amount": "10.00",
            "scheduled_at": "2020-01-01T00:00:00Z"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("future"));
}

#[tokio::test]
async fn scheduled_update_rejects_past_time_before_any_io() {
    let server = server();
    let response = server
        .put(&format!("/api/scheduled/{}", Uuid::new_v4()))
        .json(&json!({
            "kind": "CREDIT",
            "currency": "USD",
            "amount": "10.00",
            "scheduled_at": "2020-01-01T00:00:00Z"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("future"));
}

#[tokio::test]
async fn scheduled_transfer_requires_counterparty() {
    let server = server();
    let response = server
        .post("/api/scheduled")
        .json(&json!({
            "user_id": Uuid::new_v4(),
            "kind": "TRANSFER",
            "currency": "USD",
            "amount": "10.00",
            "scheduled_at": "2030-01-01T00:00:00Z"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}
