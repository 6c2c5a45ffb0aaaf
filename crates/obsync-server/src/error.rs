//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Control error: {0}")]
    Control(#[from] obsync_core::ControlError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] obsync_dashboard::DashboardError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] obsync_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
