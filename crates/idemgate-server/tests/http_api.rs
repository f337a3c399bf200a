//! End-to-end HTTP tests driving the router in-process.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use idemgate_core::config::GatewayConfig;
use idemgate_core::store::SqliteRecordStore;
use idemgate_server::metrics::GatewayMetrics;
use idemgate_server::routes;
use idemgate_server::state::AppState;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn test_router() -> Router {
    let config = GatewayConfig::default();
    let store = Arc::new(SqliteRecordStore::open_in_memory().unwrap());
    let state = Arc::new(AppState::new(
        store,
        &config,
        GatewayMetrics::new().unwrap(),
        CancellationToken::new(),
    ));
    routes::router(state)
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

fn payment(key: &str, amount: i64) -> Value {
    json!({
        "idempotency_key": key,
        "merchant_id": "m1",
        "customer_id": "c1",
        "amount": amount,
        "currency": "BRL",
    })
}

#[tokio::test]
async fn test_payment_lifecycle_over_http() {
    let router = test_router();

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/payments",
        Some(payment("A", 5000)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["attempt_count"], 1);
    assert_eq!(body["status"], "processing");
    let payment_id = body["payment_id"].as_str().unwrap().to_owned();
    assert!(payment_id.starts_with("pay_"));

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/payments",
        Some(payment("A", 5000)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["attempt_count"], 2);
    assert_eq!(body["payment_id"], payment_id.as_str());

    let (status, _) = send(
        &router,
        Method::PATCH,
        "/v1/payments/A/complete",
        Some(json!({"status": "succeeded", "response_body": {"tx": "t1"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/payments",
        Some(payment("A", 5000)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["response_body"], json!({"tx": "t1"}));
    assert_eq!(body["attempt_count"], 3);

    // Reusing the key with a different amount is a conflict of parameters.
    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/payments",
        Some(payment("A", 9999)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("do not match"));
}

#[tokio::test]
async fn test_failed_payment_retry_over_http() {
    let router = test_router();

    send(&router, Method::POST, "/v1/payments", Some(payment("B", 100))).await;
    let (status, _) = send(
        &router,
        Method::PATCH,
        "/v1/payments/B/complete",
        Some(json!({"status": "failed"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/payments",
        Some(payment("B", 100)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["attempt_count"], 2);
}

#[tokio::test]
async fn test_completion_error_mapping() {
    let router = test_router();

    let (status, _) = send(
        &router,
        Method::PATCH,
        "/v1/payments/missing/complete",
        Some(json!({"status": "succeeded"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(&router, Method::POST, "/v1/payments", Some(payment("C", 100))).await;
    let (status, body) = send(
        &router,
        Method::PATCH,
        "/v1/payments/C/complete",
        Some(json!({"status": "refunded"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("invalid status"));

    send(
        &router,
        Method::PATCH,
        "/v1/payments/C/complete",
        Some(json!({"status": "succeeded"})),
    )
    .await;
    let (status, _) = send(
        &router,
        Method::PATCH,
        "/v1/payments/C/complete",
        Some(json!({"status": "failed"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_invalid_request_rejected() {
    let router = test_router();
    let (status, body) = send(
        &router,
        Method::POST,
        "/v1/payments",
        Some(json!({
            "idempotency_key": "D",
            "merchant_id": "",
            "customer_id": "c1",
            "amount": 100,
            "currency": "BRL",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("merchant_id"));
}

#[tokio::test]
async fn test_policy_endpoints() {
    let router = test_router();

    let (status, _) = send(&router, Method::GET, "/v1/merchants/m1/policy", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &router,
        Method::PUT,
        "/v1/merchants/m1/policy",
        Some(json!({"retry_discipline": "lenient", "retention_hours": 48})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "updated");

    let (status, body) = send(&router, Method::GET, "/v1/merchants/m1/policy", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["retry_discipline"], "lenient");
    assert_eq!(body["retention_hours"], 48);

    let (status, _) = send(
        &router,
        Method::PUT,
        "/v1/merchants/m1/policy",
        Some(json!({"retry_discipline": "lenient", "retention_hours": 36})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &router,
        Method::PUT,
        "/v1/merchants/m1/policy",
        Some(json!({"retry_discipline": "aggressive", "retention_hours": 24})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_duplicate_report_endpoint() {
    let router = test_router();

    for _ in 0..2 {
        send(&router, Method::POST, "/v1/payments", Some(payment("E", 5000))).await;
    }
    for _ in 0..5 {
        send(&router, Method::POST, "/v1/payments", Some(payment("F", 1000))).await;
    }

    let (status, body) = send(&router, Method::GET, "/v1/merchants/m1/duplicates", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_requests"], 7);
    assert_eq!(body["unique_payments"], 2);
    assert_eq!(body["duplicate_count"], 5);
    let suspicious = body["suspicious_keys"].as_array().unwrap();
    assert_eq!(suspicious.len(), 1);
    assert_eq!(suspicious[0]["idempotency_key"], "F");
    assert_eq!(body["amount_at_risk"], 5000 + 4 * 1000);
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let router = test_router();
    send(&router, Method::POST, "/v1/payments", Some(payment("G", 100))).await;
    send(&router, Method::POST, "/v1/payments", Some(payment("G", 100))).await;

    let (status, body) = send(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&router, Method::GET, "/v1/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_requests"], 2);
    assert_eq!(body["new_payments"], 1);
    assert_eq!(body["duplicate_blocked"], 1);

    let (status, body) = send(&router, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("idemgate_decisions_total"));
    assert!(text.contains("idemgate_http_requests_total"));
}

#[tokio::test]
async fn test_request_id_propagation() {
    let router = test_router();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header("x-request-id", "req_abc123")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req_abc123");

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let minted = response.headers()["x-request-id"].to_str().unwrap();
    assert!(minted.starts_with("req_"));
}
