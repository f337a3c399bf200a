//! HTTP routes and outcome-to-status mapping.

mod merchants;
mod payments;
mod system;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, patch, post, put};
use axum::Router;
use serde::Serialize;

use crate::middleware;
use crate::state::SharedState;

/// JSON error body shared by every failure response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    pub error: String,
}

impl ErrorBody {
    fn new(error: impl std::fmt::Display) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

/// Builds the gateway router.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/metrics", get(system::prometheus_metrics))
        .route("/v1/metrics", get(system::monitor_snapshot))
        .route("/v1/payments", post(payments::process_payment))
        .route(
            "/v1/payments/{key}/complete",
            patch(payments::complete_payment),
        )
        .route(
            "/v1/merchants/{merchant_id}/duplicates",
            get(merchants::duplicate_report),
        )
        .route(
            "/v1/merchants/{merchant_id}/policy",
            put(merchants::update_policy).get(merchants::get_policy),
        )
        .layer(from_fn_with_state(state.clone(), middleware::track_requests))
        .layer(from_fn(middleware::request_id))
        .with_state(state)
}
