//! obsync server - Entry Point
//!
//! Monitors OBS through obs-websocket and fans state out to dashboard clients.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// OBS state synchronization server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via OBSYNC_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    obsync_telemetry::init_logging()?;

    info!("Starting obsync v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > OBSYNC_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("OBSYNC_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = obsync_server::AppConfig::load(&config_path)?;
    info!(
        obs_url = %config.obs.url(),
        dashboard_port = config.dashboard.port,
        "Configuration loaded"
    );

    let app = obsync_server::Application::connect(config).await?;
    app.run().await?;

    Ok(())
}
