//! obsync-dashboard - Dashboard fan-out for obsync.
//!
//! This crate owns the server side of the dashboard protocol:
//!
//! - `BroadcastHub`: registry of connected clients, snapshot on register,
//!   non-blocking fan-out, inbound command handling
//! - `CommandRouter`: explicit `type -> handler` table for client commands
//! - an axum server exposing the WebSocket and a few HTTP endpoints
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ChangeEvent  ┌──────────────┐  try_send  ┌──────────────┐
//! │ StateMonitor │ ────────────▶ │ BroadcastHub │ ─────────▶ │ socket tasks │
//! └──────┬───────┘               └──────┬───────┘            └──────┬───────┘
//!        │ snapshot                     │ commands                  │
//!        └──────────────────────────────┤◀──────────────────────────┘
//!                                       ▼
//!                               ControlClient (OBS)
//!
//! GET /ws           → WebSocket upgrade
//! GET /api/snapshot → JSON snapshot
//! GET /metrics      → Prometheus text
//! GET /health       → liveness
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod hub;
pub mod server;

pub use commands::{CommandHandler, CommandReply, CommandRouter, ForwardCommand, StatusCommand};
pub use config::DashboardConfig;
pub use error::{CommandError, CommandResult, DashboardError, DashboardResult};
pub use hub::{BroadcastHub, BroadcastReport, Connection, ConnectionState, Frame};
pub use server::{create_router, run_server, serve, AppState, ConnectionLimiter};
