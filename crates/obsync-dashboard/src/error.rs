//! Dashboard error types.

use std::net::SocketAddr;

use obsync_core::ControlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(std::io::Error),
}

pub type DashboardResult<T> = Result<T, DashboardError>;

/// Command handling failures, reported to the sending client as `Error`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command type: {0}")]
    Unknown(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Control(#[from] ControlError),
}

pub type CommandResult<T> = Result<T, CommandError>;
