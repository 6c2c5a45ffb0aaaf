//! OBS connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// obs-websocket connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsConfig {
    /// Host running OBS. Must be loopback, a private address or `localhost`.
    #[serde(default = "default_host")]
    pub host: String,
    /// obs-websocket port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// obs-websocket password (empty = authentication disabled).
    #[serde(default)]
    pub password: String,
    /// Handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4455
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ObsConfig {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn password(&self) -> Option<&str> {
        (!self.password.is_empty()).then_some(self.password.as_str())
    }
}
