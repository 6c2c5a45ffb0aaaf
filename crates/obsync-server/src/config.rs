//! Application configuration.

use std::path::Path;

use obsync_dashboard::DashboardConfig;
use obsync_monitor::MonitorConfig;
use obsync_obs::ObsConfig;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Environment variable overriding `obs.password`.
pub const PASSWORD_ENV: &str = "OBS_PASSWORD";

/// Top-level configuration, one table per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub obs: ObsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl AppConfig {
    /// Load from a specific file, then apply environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let mut config = Self::from_toml(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load from `path` if it exists, defaults otherwise.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> AppResult<()> {
        obsync_obs::validate_host(&self.obs.host)
            .map_err(|e| AppError::Config(format!("obs.host: {e}")))?;
        if self.dashboard.max_connections == 0 {
            return Err(AppError::Config(
                "dashboard.max_connections must be at least 1".to_string(),
            ));
        }
        if self.dashboard.client_queue_capacity == 0 {
            return Err(AppError::Config(
                "dashboard.client_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            self.obs.password = password;
        }
    }
}
