//! IMU Orchestrator — entry point.

use api::{init_logging, run, ApiConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(version = env!("CARGO_PKG_VERSION"), "starting IMU orchestrator");

    run(ApiConfig::from_env()).await
}
