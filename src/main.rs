//! # Emergency Alerting Main Entry Point
//!
//! This is the main entry point for the alerting service.

use alerting::{config::ConfigLoader, server::run_server, telemetry::init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = ConfigLoader::new().load()?;

    init_tracing(&config)?;

    info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        info!(config = %redacted_json, "Effective configuration");
    }

    run_server(config).await
}
