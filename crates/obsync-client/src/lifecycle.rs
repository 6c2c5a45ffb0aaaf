//! Socket lifecycle state machine.
//!
//! ```text
//! disconnected → connecting → connected → disconnected → connecting → ...
//!                                                     └→ disconnected (terminal)
//! ```
//!
//! Pure bookkeeping: the caller reports transport events and acts on the
//! returned [`CloseAction`]. Reconnects use a fixed delay and a hard cap.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::ClientConfig;

/// Connection status shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What to do after the socket closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Reconnect after the delay.
    Retry(Duration),
    /// Retries exhausted (or already terminal).
    GiveUp,
}

#[derive(Debug, Clone)]
struct ErrorNotice {
    message: String,
    raised_at: Instant,
    terminal: bool,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    status: ConnectionStatus,
    retry_count: u32,
    max_retries: u32,
    retry_delay: Duration,
    error_clear: Duration,
    error: Option<ErrorNotice>,
    connect_attempts: u64,
}

impl Lifecycle {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            retry_count: 0,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            error_clear: config.error_clear(),
            error: None,
            connect_attempts: 0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Reconnects scheduled since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Total `connecting` transitions so far.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.terminal)
    }

    /// Start an attempt. Refused once terminal.
    pub fn on_connecting(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = ConnectionStatus::Connecting;
        self.connect_attempts += 1;
        true
    }

    pub fn on_open(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.retry_count = 0;
        self.error = None;
    }

    /// Record a transient error. Does not change the status; the close that
    /// follows does.
    pub fn on_error(&mut self, message: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.error = Some(ErrorNotice {
            message: message.into(),
            raised_at: Instant::now(),
            terminal: false,
        });
    }

    pub fn on_close(&mut self) -> CloseAction {
        self.status = ConnectionStatus::Disconnected;
        if self.is_terminal() {
            return CloseAction::GiveUp;
        }

        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            CloseAction::Retry(self.retry_delay)
        } else {
            self.error = Some(ErrorNotice {
                message: format!(
                    "Connection lost after {} reconnect attempts, reload to retry",
                    self.max_retries
                ),
                raised_at: Instant::now(),
                terminal: true,
            });
            CloseAction::GiveUp
        }
    }

    /// Clear a terminal state (manual recovery).
    pub fn reset(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.retry_count = 0;
        self.error = None;
    }

    /// Visible error at `now`. Transient errors expire; terminal ones do not.
    pub fn current_error(&self, now: Instant) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|e| e.terminal || now.duration_since(e.raised_at) < self.error_clear)
            .map(|e| e.message.as_str())
    }
}
