//! Credits Pipeline - Server Binary
//!
//! Starts the billing pipeline and its HTTP surface.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin credits-server
//!
//! # Run with environment variables
//! CREDITS_PORT=8000 CREDITS_WORKERS=4 CREDITS_DEFAULT_GRANT=1000 cargo run --bin credits-server
//! ```
//!
//! # Environment Variables
//!
//! * `CREDITS_HOST` - Server host (default: 0.0.0.0)
//! * `CREDITS_PORT` - Server port (default: 8000)
//! * `CREDITS_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)
//! * `CREDITS_WORKERS` - Number of billing workers (default: 10)
//! * `CREDITS_MAX_CONFLICTS` - Conflicting writes tolerated per measurement (default: 3)
//! * `CREDITS_MAX_UNAVAILABLE_RETRIES` - Retries while the store is down (default: 3)
//! * `CREDITS_BACKOFF_INITIAL_MS` / `CREDITS_BACKOFF_MAX_MS` - Retry delays (default: 100 / 5000)
//! * `CREDITS_DRAIN_TIMEOUT_SECS` - Shutdown drain timeout (default: 30)
//! * `CREDITS_PRECISION` - Decimal places of credits (default: 2)
//! * `CREDITS_PROJECT_WHITELIST` - Semicolon separated projects to bill (default: all)
//! * `CREDITS_NOTIFY_THRESHOLDS` - Semicolon separated thresholds (default: 50%)
//! * `CREDITS_DEFAULT_GRANT` - Credits for projects without a ledger (default: none)

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::{InMemoryAttributeStore, InMemoryHistoryStore, LogNotifier};
use domain_metering::MetricRegistry;
use infra_pipeline::{Pipeline, PipelinePorts};
use interface_api::{config::ServiceConfig, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env().context("loading configuration")?;
    init_tracing(&config.log_level);

    let pipeline_config = config.pipeline_config()?;
    let attribute_store = match config.default_grant() {
        Some(granted) => InMemoryAttributeStore::with_default_grant(granted),
        None => InMemoryAttributeStore::new(),
    };
    let history_store = Arc::new(InMemoryHistoryStore::new());
    let ports = PipelinePorts {
        attribute_store: Arc::new(attribute_store),
        history_store: history_store.clone(),
        notifier: Arc::new(LogNotifier),
    };

    let pipeline = Arc::new(Pipeline::start(
        pipeline_config,
        Arc::new(MetricRegistry::with_defaults()),
        ports,
    )?);
    let app = create_router(AppState::new(Arc::clone(&pipeline), history_store));

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid server address {}", config.server_addr()))?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let report = pipeline.shutdown().await;
    tracing::info!(
        timed_out = report.timed_out,
        dropped = report.dropped,
        "Server shutdown complete"
    );
    Ok(())
}

/// Initializes the tracing subscriber, `RUST_LOG` wins over `log_level`
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
