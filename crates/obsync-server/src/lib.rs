//! obsync application.
//!
//! Wires the components together:
//! - obs-websocket control client (with per-call timeout)
//! - state monitor (polling plus native events)
//! - broadcast hub and dashboard server
//! - command routing back into OBS

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
