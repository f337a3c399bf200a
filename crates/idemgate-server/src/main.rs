//! idemgate-server - HTTP shell for the idempotency gateway.
//!
//! Startup order: parse flags, initialize tracing, load configuration
//! (flags override file values), open the database, optionally seed
//! sample data, spawn the retention sweeper, then serve until SIGINT or
//! SIGTERM. Shutdown cancels the sweeper and in-flight core operations
//! through one shared cancellation token.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use idemgate_core::config::GatewayConfig;
use idemgate_core::store::SqliteRecordStore;
use idemgate_core::sweeper::RetentionSweeper;
use idemgate_server::metrics::GatewayMetrics;
use idemgate_server::routes;
use idemgate_server::seed;
use idemgate_server::state::AppState;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// idemgate - idempotency gateway for payment submissions
#[derive(Parser, Debug)]
#[command(name = "idemgate-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the gateway configuration file
    #[arg(short, long, default_value = "idemgate.toml")]
    config: PathBuf,

    /// Address to bind the HTTP server to (overrides config)
    #[arg(long)]
    listen: Option<String>,

    /// Path to the SQLite database file (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Load sample payment data on startup
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config = load_config(&args)?;
    info!(
        database = %config.database_path.display(),
        listen = %config.listen_addr,
        retention_ttl_hours = config.retention_ttl_hours,
        "configuration loaded"
    );

    let store = Arc::new(
        SqliteRecordStore::open(&config.database_path).context("failed to open database")?,
    );
    let metrics = GatewayMetrics::new().context("failed to initialize metrics registry")?;
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        Arc::clone(&store),
        &config,
        metrics,
        shutdown.clone(),
    ));

    if args.seed {
        let summary = seed::populate(store.as_ref())
            .await
            .context("failed to seed sample data")?;
        info!(
            records = summary.records,
            policies = summary.policies,
            "sample data seeded"
        );
    }

    let sweeper_task = {
        let sweeper = RetentionSweeper::new(Arc::clone(&store));
        let interval = config.sweep_interval();
        let cancel = shutdown.child_token();
        tokio::spawn(async move { sweeper.run(interval, cancel).await })
    };

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => info!(signal = name, "shutdown signal received"),
            Err(e) => warn!(error = %e, "signal handler failed, shutting down"),
        }
        signal_shutdown.cancel();
    });

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "idempotency gateway listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await
        .context("server error")?;

    info!("http server stopped, waiting for background tasks");
    shutdown.cancel();
    sweeper_task.await.context("sweeper task panicked")?;
    info!("gateway shutdown complete");
    Ok(())
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter =
        EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = if args.config.exists() {
        GatewayConfig::from_file(&args.config).context("failed to load configuration")?
    } else {
        info!(path = %args.config.display(), "no config file found, using defaults");
        GatewayConfig::default()
    };

    if let Some(listen) = &args.listen {
        config.listen_addr.clone_from(listen);
    }
    if let Some(database) = &args.database {
        config.database_path.clone_from(database);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn wait_for_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate()).context("failed to register SIGTERM")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to register SIGINT")?;
    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}
