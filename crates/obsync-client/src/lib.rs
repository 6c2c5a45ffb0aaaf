//! obsync-client - Dashboard client.
//!
//! Keeps one logical connection to the dashboard server and mirrors its
//! state locally:
//!
//! - `Lifecycle`: connection state machine with a fixed retry delay and cap
//! - `DispatchTable`: explicit `type -> handler` table for server messages
//! - `ClientState`: one cell per facet, written only by the dispatch table
//! - `DashboardConnection`: socket ownership, run loop, `watch` channels for
//!   observers
//!
//! # Usage
//!
//! ```ignore
//! let conn = DashboardConnection::new(ClientConfig::new("ws://127.0.0.1:8080/ws"));
//! conn.initialize();
//! let mut state = conn.subscribe_state();
//! while state.changed().await.is_ok() {
//!     println!("scene: {:?}", state.borrow().scene);
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod state;

pub use client::DashboardConnection;
pub use config::ClientConfig;
pub use dispatch::{DispatchOutcome, DispatchTable, Handler};
pub use error::{ClientError, ClientResult};
pub use lifecycle::{CloseAction, ConnectionStatus, Lifecycle};
pub use state::ClientState;
