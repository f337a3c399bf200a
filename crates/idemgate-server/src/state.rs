//! Shared server state.

use std::sync::Arc;

use idemgate_core::config::GatewayConfig;
use idemgate_core::engine::DecisionEngine;
use idemgate_core::monitor::DecisionMonitor;
use idemgate_core::policy::PolicyStore;
use idemgate_core::recorder::CompletionRecorder;
use idemgate_core::report::DuplicateReporter;
use idemgate_core::store::SqliteRecordStore;
use tokio_util::sync::CancellationToken;

use crate::metrics::GatewayMetrics;

/// Everything the request handlers need, shared across connections.
pub struct AppState {
    /// The decision engine.
    pub engine: DecisionEngine<SqliteRecordStore>,
    /// The completion recorder.
    pub recorder: CompletionRecorder<SqliteRecordStore>,
    /// The duplicate reporter.
    pub reporter: DuplicateReporter<SqliteRecordStore>,
    /// Merchant policy access.
    pub policies: PolicyStore<SqliteRecordStore>,
    /// Sliding-window anomaly monitor.
    pub monitor: DecisionMonitor,
    /// Prometheus metrics registry.
    pub metrics: GatewayMetrics,
    /// The shared record store (for health checks and the sweeper).
    pub store: Arc<SqliteRecordStore>,
    /// Cancelled on shutdown; handlers pass it into core operations.
    pub shutdown: CancellationToken,
}

/// Handle shared by handlers and background tasks.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wires all components over one shared store.
    pub fn new(
        store: Arc<SqliteRecordStore>,
        config: &GatewayConfig,
        metrics: GatewayMetrics,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine: DecisionEngine::new(Arc::clone(&store), config.retention_ttl()),
            recorder: CompletionRecorder::new(Arc::clone(&store)),
            reporter: DuplicateReporter::new(
                Arc::clone(&store),
                config.suspicious_attempt_threshold,
            ),
            policies: PolicyStore::new(Arc::clone(&store)),
            monitor: DecisionMonitor::new(config.window(), config.anomaly_threshold_percent),
            metrics,
            store,
            shutdown,
        }
    }
}
