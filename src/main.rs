//! scribed - collaborative document agent daemon.

use std::sync::Arc;

use scribed::backend::Backend;
use scribed::config::Config;
use scribed::db::Database;
use scribed::service::DocumentService;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        rpc_port = config.server.rpc_port,
        metrics_port = config.server.metrics_port,
        snapshot_threshold = config.backend.snapshot_threshold,
        "Starting scribed"
    );

    // Initialize metrics before anything records them
    scribed::metrics::init();

    // Open the store
    let db = Database::new(&config.database.path).await?;

    // Build shared state and the service surface
    let backend = Arc::new(Backend::new(config.backend.clone(), db));
    let service = DocumentService::new(Arc::clone(&backend));

    // Prometheus endpoint on its own task
    tokio::spawn(scribed::http::run_http_server(config.server.metrics_port));

    // The RPC transport binds the service here; its wiring lives outside
    // this crate. Keep the service alive until shutdown.
    let _service = service;
    if config.tls.is_some() {
        info!("TLS material loaded for the transport layer");
    }
    info!(port = config.server.rpc_port, "Agent core ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
