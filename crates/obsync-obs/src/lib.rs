//! obsync-obs - obs-websocket 5.x transport for obsync.
//!
//! Implements `obsync_core::ControlClient` on top of `tokio-tungstenite`:
//!
//! - Hello / Identify handshake with optional SHA-256 authentication
//! - request/response correlation by request id
//! - event fan-out (General, Config, Scenes and Outputs subscriptions)
//! - capability query through `GetVersion.availableRequests`
//! - lazy reconnection on the next call after a lost session

pub mod client;
pub mod config;
pub mod protocol;

pub use client::{ConnectionState, ObsClient};
pub use config::ObsConfig;
pub use protocol::validate_host;
