//! Quality-control HTTP server
//!
//! Read-only API over the inference service and the persisted artifacts:
//! batch analysis, reference metrics, feature importances and sensor
//! summaries for a dashboard front end.

mod api;
mod error;
mod state;
mod handlers;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use crate::artifacts::ArtifactPaths;
use crate::inference::QualityControlService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_size: usize,
    /// Clean table backing the sensor endpoints
    pub clean_data_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("QC_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("QC_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            max_upload_size: std::env::var("QC_MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024), // 100MB
            clean_data_path: std::env::var("QC_CLEAN_DATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| ArtifactPaths::default().clean_data()),
        }
    }
}

/// Start the server with the given configuration and service
pub async fn run_server(config: ServerConfig, service: Arc<QualityControlService>) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();

    if !service.has_model() {
        warn!("Serving without a model; /api/analyze will answer 503");
    }
    if !config.clean_data_path.exists() {
        warn!(
            path = %config.clean_data_path.display(),
            "Clean table not found, sensor endpoints will answer 404"
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let state = Arc::new(AppState::new(config.clone(), service));
    let app = create_router(state);

    info!(
        host = %config.host,
        port = config.port,
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        started_at = %start_time.to_rfc3339(),
        "Quality-control server starting"
    );
    info!(url = %format!("http://{}/api/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
