//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Dashboard client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Dashboard WebSocket URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Reconnect attempts after the initial one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between reconnect attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How long a transient error stays visible.
    #[serde(default = "default_error_clear_ms")]
    pub error_clear_ms: u64,
    /// Outbound frames buffered while the socket is busy.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

fn default_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    3000
}

fn default_error_clear_ms() -> u64 {
    5000
}

fn default_outbound_queue() -> usize {
    32
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            error_clear_ms: default_error_clear_ms(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn error_clear(&self) -> Duration {
        Duration::from_millis(self.error_clear_ms)
    }
}
