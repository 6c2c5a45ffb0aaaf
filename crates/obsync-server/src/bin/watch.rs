//! obsync-watch: follow a dashboard server from the terminal.
//!
//! Prints connection and state changes as they arrive. With `--command`,
//! sends one command once connected.

use anyhow::{Context, Result};
use clap::Parser;
use obsync_client::{ClientConfig, ConnectionStatus, DashboardConnection};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Follow obsync dashboard state", long_about = None)]
struct Args {
    /// Dashboard WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Command to send once connected (e.g. SetCurrentScene)
    #[arg(long)]
    command: Option<String>,

    /// JSON payload for --command
    #[arg(long, default_value = "{}")]
    payload: String,

    /// Reconnect attempts before giving up
    #[arg(long, default_value_t = 10)]
    max_retries: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    obsync_telemetry::init_logging()?;

    let payload: Value = serde_json::from_str(&args.payload).context("Invalid --payload JSON")?;
    let conn = DashboardConnection::new(ClientConfig {
        max_retries: args.max_retries,
        ..ClientConfig::new(args.url)
    });
    conn.initialize();

    let mut status = conn.subscribe_status();
    let mut state = conn.subscribe_state();
    let mut pending_command = args.command;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!(status = ?current, "Connection status");

                if current == ConnectionStatus::Connected {
                    if let Some(command) = pending_command.take() {
                        if let Err(e) = conn.send(&command, payload.clone()) {
                            warn!(%command, error = %e, "Command not sent");
                        }
                    }
                } else if conn.is_terminal() {
                    if let Some(error) = conn.current_error() {
                        warn!(%error, "Giving up");
                    }
                    break;
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = serde_json::to_string(&*state.borrow_and_update())?;
                println!("{snapshot}");
            }
        }
    }

    conn.shutdown();
    Ok(())
}
