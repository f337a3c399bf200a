//! Request-id propagation and per-request logging.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;
use uuid::Uuid;

use crate::state::SharedState;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Echoes the caller's `x-request-id` onto the response, minting one when
/// absent.
pub async fn request_id(req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(
            || format!("req_{}", Uuid::new_v4().simple()),
            str::to_owned,
        );

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Emits one log line per request and feeds the HTTP request counter.
///
/// The metric is labeled with the matched route template, not the raw
/// path, to keep label cardinality bounded.
pub async fn track_requests(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| path.clone(), |matched| matched.as_str().to_owned());

    let start = Instant::now();
    let response = next.run(req).await;
    let status = response.status().as_u16();

    state.metrics.record_http(method.as_str(), &route, status);
    info!(
        method = %method,
        path = %path,
        status,
        latency_ms = start.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}
