//! Payment submission and completion endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use idemgate_core::engine::{Decision, EngineError, Rejection};
use idemgate_core::record::{CompleteRequest, PaymentRequest};
use idemgate_core::recorder::CompleteError;
use serde_json::json;
use tracing::error;

use super::ErrorBody;
use crate::state::SharedState;

/// `POST /v1/payments`
pub async fn process_payment(
    State(state): State<SharedState>,
    Json(req): Json<PaymentRequest>,
) -> Response {
    match state.engine.process(&req, &state.shutdown).await {
        Ok(outcome) => {
            state.monitor.record(outcome.decision);
            state.metrics.record_decision(outcome.decision);
            (decision_status(outcome.decision), Json(outcome.view)).into_response()
        }
        Err(err @ EngineError::InvalidRequest(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody::new(err)),
        )
            .into_response(),
        Err(err @ EngineError::Cancelled) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody::new(err)),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "payment decision failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(err)),
            )
                .into_response()
        }
    }
}

/// `PATCH /v1/payments/{key}/complete`
pub async fn complete_payment(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Response {
    match state.recorder.complete(&key, &req, &state.shutdown).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({"status": "completed", "idempotency_key": key})),
        )
            .into_response(),
        Err(err) => {
            let status = match &err {
                CompleteError::InvalidStatus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CompleteError::NotFound { .. } => StatusCode::NOT_FOUND,
                CompleteError::AlreadyCompleted { .. } => StatusCode::CONFLICT,
                CompleteError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                _ => {
                    error!(error = %err, key, "completion failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, Json(ErrorBody::new(err))).into_response()
        }
    }
}

/// Maps a decision to the status code contract: accepted outcomes are
/// 201, in-flight duplicates conflict, mismatches are unprocessable, and
/// replays return the cached response with 200.
fn decision_status(decision: Decision) -> StatusCode {
    match decision {
        Decision::Accepted(_) => StatusCode::CREATED,
        Decision::Rejected(Rejection::InProgress) => StatusCode::CONFLICT,
        Decision::Rejected(Rejection::Mismatch) => StatusCode::UNPROCESSABLE_ENTITY,
        Decision::Replay => StatusCode::OK,
    }
}
