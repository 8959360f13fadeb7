//! IMU Orchestrator — composition root.
//!
//! Binds the HTTP adapter controller (§6.1) to a running [`Orchestrator`]
//! and owns process lifecycle. This crate reads the process environment
//! once, at startup; none of the core crates it depends on touch the
//! environment themselves (§6.4).

use std::sync::Arc;

use controllers::{Controller, HttpAdapterController};
use orchestrator::{Orchestrator, OrchestratorConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Composition-root configuration, read from the process environment by
/// [`ApiConfig::from_env`]. Plain value object, reference-system style
/// (`SchedulerConfig`, `AlertConfig`) — no config-file format is read here.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub http_port: u16,
}

impl ApiConfig {
    pub const DEFAULT_PORT: u16 = 8080;

    /// Reads `IMU_ORCHESTRATOR_HTTP_PORT` (default [`Self::DEFAULT_PORT`]).
    /// An unparseable value falls back to the default rather than failing
    /// startup.
    pub fn from_env() -> Self {
        let http_port = std::env::var("IMU_ORCHESTRATOR_HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_PORT);
        Self { http_port }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_port: Self::DEFAULT_PORT,
        }
    }
}

/// Initialize the global `tracing` subscriber from `RUST_LOG` (standard
/// `tracing-subscriber` env filter syntax), defaulting to `info`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build an [`Orchestrator`] with an [`HttpAdapterController`] already
/// registered against it (but not yet started).
pub async fn build(config: &ApiConfig) -> (Arc<Orchestrator>, Arc<HttpAdapterController>) {
    let orchestrator = Arc::new(Orchestrator::new(OrchestratorConfig::default()));
    let http_controller = Arc::new(HttpAdapterController::new(config.http_port));
    let controller: Arc<dyn Controller> = Arc::clone(&http_controller) as Arc<dyn Controller>;
    orchestrator.register_controller(controller).await;
    (orchestrator, http_controller)
}

/// Start the orchestrator and block until a shutdown signal (Ctrl+C) is
/// received, then tear everything down.
pub async fn run(config: ApiConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (orchestrator, _http_controller) = build(&config).await;

    if !orchestrator.start().await {
        return Err("orchestrator failed to start".into());
    }
    info!(port = config.http_port, "IMU orchestrator running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    orchestrator.dispose().await;
    Ok(())
}
