//! Monitor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// State monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Use native change notifications when the control client offers them.
    #[serde(default = "default_push_enabled")]
    pub push_enabled: bool,
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_push_enabled() -> bool {
    true
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            push_enabled: default_push_enabled(),
        }
    }
}

impl MonitorConfig {
    /// Poll interval, never shorter than 10ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}
