//! HTTP routes exercised through `tower::ServiceExt::oneshot`

mod common;

use access_ledger::api;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let service = build_service(Arc::new(setup_test_db().await), test_clock());
    api::router(Arc::new(service))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn record_body(id: &str) -> Value {
    json!({
        "id": id,
        "payload": {
            "schema": "v1",
            "name": "Grace",
            "age": 34,
            "weight": 62.0,
            "bloodType": "A+",
            "conditions": ["asthma"],
            "medications": [],
            "allergies": ["latex"]
        }
    })
}

#[tokio::test]
async fn test_health_and_status() {
    let app = app().await;

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], false);
    assert_eq!(body["ledger"]["head_source"], "durable");
}

#[tokio::test]
async fn test_submit_list_and_emergency_fetch() {
    let app = app().await;

    let (status, body) = call(&app, "POST", "/records", Some(record_body("P1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stored_in"], "durable");

    let (status, body) = call(&app, "GET", "/records", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "P1");
    assert_eq!(body[0]["name"], "Grace");
    assert_eq!(body[0]["condition"], "asthma");
    assert!(body[0].get("payload").is_none());
    assert!(body[0].get("bloodType").is_none());

    let (status, body) = call(
        &app,
        "POST",
        "/records/P1/emergency",
        Some(json!({ "actor_id": "D1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["name"], "Grace");
    assert_eq!(body["access_log"]["action"], "EMERGENCY_DATA_REQUEST");
    assert_eq!(body["access_log"]["subject_id"], "P1");

    let (status, body) = call(
        &app,
        "POST",
        "/records/visibility",
        Some(json!({ "id": "P1", "visible": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notifications"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_invalid_input_is_generic_400() {
    let app = app().await;

    let mut bad = record_body("P1");
    bad["payload"]["bloodType"] = json!("Z+");
    let (status, body) = call(&app, "POST", "/records", Some(bad)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "invalid data" }));

    let mut injected = record_body("P1");
    injected["payload"]["name"] = json!("x'; DROP TABLE records; --");
    let (status, body) = call(&app, "POST", "/records", Some(injected)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "invalid data" }));
}

#[tokio::test]
async fn test_unknown_record_is_404() {
    let app = app().await;
    let (status, body) = call(
        &app,
        "POST",
        "/records/P404/emergency",
        Some(json!({ "actor_id": "D1" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "record not available" }));
}

#[tokio::test]
async fn test_ledger_routes_require_secret() {
    let app = app().await;
    call(&app, "POST", "/records", Some(record_body("P1"))).await;
    call(
        &app,
        "POST",
        "/records/P1/emergency",
        Some(json!({ "actor_id": "D1", "reason": "unresponsive" })),
    )
    .await;

    let (status, body) = call(&app, "POST", "/ledger", Some(json!({ "secret": "guess" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "access denied" }));

    let (status, body) = call(
        &app,
        "POST",
        "/ledger",
        Some(json!({ "secret": AUDITOR_SECRET, "limit": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "durable");
    assert_eq!(body["entries"][0]["details"], "unresponsive");

    let (status, body) = call(
        &app,
        "POST",
        "/ledger/verify",
        Some(json!({ "secret": AUDITOR_SECRET })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["durable"]["is_valid"], true);
    assert_eq!(body["durable"]["entry_count"], 1);
}
