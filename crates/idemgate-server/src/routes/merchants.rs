//! Merchant reporting and policy endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, TimeDelta, Utc};
use idemgate_core::policy::{PolicyError, RetryDiscipline};
use idemgate_core::report::ReportError;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::ErrorBody;
use crate::state::SharedState;

/// Query range for duplicate reports; defaults to the last 24 hours.
#[derive(Debug, Deserialize)]
pub struct ReportRange {
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

/// `GET /v1/merchants/{merchant_id}/duplicates`
pub async fn duplicate_report(
    State(state): State<SharedState>,
    Path(merchant_id): Path<String>,
    Query(range): Query<ReportRange>,
) -> Response {
    let now = Utc::now();
    let from = range.from.unwrap_or(now - TimeDelta::hours(24));
    let to = range.to.unwrap_or(now);

    match state
        .reporter
        .report(&merchant_id, from, to, &state.shutdown)
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err @ ReportError::Cancelled) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody::new(err)),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, merchant_id, "duplicate report failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(err)),
            )
                .into_response()
        }
    }
}

/// Request body for `PUT .../policy`.
#[derive(Debug, Deserialize)]
pub struct PolicyBody {
    retry_discipline: String,
    retention_hours: u32,
}

/// `PUT /v1/merchants/{merchant_id}/policy`
pub async fn update_policy(
    State(state): State<SharedState>,
    Path(merchant_id): Path<String>,
    Json(body): Json<PolicyBody>,
) -> Response {
    let Some(discipline) = RetryDiscipline::parse(&body.retry_discipline) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody::new(PolicyError::InvalidDiscipline {
                value: body.retry_discipline,
            })),
        )
            .into_response();
    };

    match state
        .policies
        .upsert(&merchant_id, discipline, body.retention_hours, &state.shutdown)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({"status": "updated", "merchant_id": merchant_id})),
        )
            .into_response(),
        Err(err) => policy_error_response(&merchant_id, err),
    }
}

/// `GET /v1/merchants/{merchant_id}/policy`
pub async fn get_policy(
    State(state): State<SharedState>,
    Path(merchant_id): Path<String>,
) -> Response {
    match state.policies.get(&merchant_id, &state.shutdown).await {
        Ok(policy) => (StatusCode::OK, Json(policy)).into_response(),
        Err(err) => policy_error_response(&merchant_id, err),
    }
}

fn policy_error_response(merchant_id: &str, err: PolicyError) -> Response {
    let status = match &err {
        PolicyError::InvalidDiscipline { .. } | PolicyError::InvalidRetention { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        PolicyError::NotFound { .. } => StatusCode::NOT_FOUND,
        PolicyError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => {
            error!(error = %err, merchant_id, "policy operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ErrorBody::new(err))).into_response()
}
