//! Prometheus metrics for gateway observability.
//!
//! Exposed at `GET /metrics` in Prometheus text format. The decision
//! counter mirrors the monitor's classification but is labeled per
//! outcome, which Prometheus aggregates better than a JSON snapshot.

use idemgate_core::engine::Decision;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors from metrics registration or encoding.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to register a metric with Prometheus.
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    /// Failed to encode metrics output.
    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Gateway metrics registry.
///
/// All metrics use interior mutability and the struct is cheap to clone.
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    decisions_total: CounterVec,
    http_requests_total: CounterVec,
}

impl GatewayMetrics {
    /// Creates the registry and registers all metric families.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let decisions_total = CounterVec::new(
            Opts::new(
                "idemgate_decisions_total",
                "Idempotency decisions by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "idemgate_http_requests_total",
                "HTTP requests by route and status",
            ),
            &["method", "route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            registry,
            decisions_total,
            http_requests_total,
        })
    }

    /// Counts one decision outcome.
    pub fn record_decision(&self, decision: Decision) {
        self.decisions_total
            .with_label_values(&[decision.as_str()])
            .inc();
    }

    /// Counts one handled HTTP request.
    pub fn record_http(&self, method: &str, route: &str, status: u16) {
        self.http_requests_total
            .with_label_values(&[method, route, &status.to_string()])
            .inc();
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}
