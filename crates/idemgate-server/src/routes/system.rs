//! Health, monitor snapshot, and Prometheus endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use crate::state::SharedState;

/// `GET /health`
pub async fn health(State(state): State<SharedState>) -> Response {
    match state.store.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "healthy", "database": "connected"})),
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unhealthy", "database": "disconnected"})),
            )
                .into_response()
        }
    }
}

/// `GET /v1/metrics` - point-in-time monitor snapshot as JSON.
pub async fn monitor_snapshot(State(state): State<SharedState>) -> Response {
    (StatusCode::OK, Json(state.monitor.snapshot())).into_response()
}

/// `GET /metrics` - Prometheus text format.
pub async fn prometheus_metrics(State(state): State<SharedState>) -> Response {
    match state.metrics.encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
