//! Dashboard configuration.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::{DashboardError, DashboardResult};

/// Dashboard server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Outbound frames buffered per client before it counts as stalled.
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    32
}

fn default_client_queue_capacity() -> usize {
    64
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_connections: default_max_connections(),
            client_queue_capacity: default_client_queue_capacity(),
        }
    }
}

impl DashboardConfig {
    pub fn socket_addr(&self) -> DashboardResult<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| DashboardError::InvalidAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
