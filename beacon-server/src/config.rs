//! Server configuration module.
//!
//! Composes the per-component configuration sections into one file-loadable
//! structure and applies `BEACON_*` environment overrides on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use beacon_api::ApiConfig;
use beacon_core::config::{LoggingConfig, WebhookConfig, load_config};
use beacon_core::error::ConfigError;
use beacon_store::StoreConfig;

/// Server configuration.
///
/// Contains all settings needed to start and run the Beacon server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// API server configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage configuration.
    #[serde(default)]
    pub storage: StoreConfig,

    /// Webhook ingestion configuration.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Shutdown configuration.
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl ServerConfig {
    /// Loads configuration from a file and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be loaded or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = load_config(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.api.apply_env_overrides();
        self.storage.apply_env_overrides();
        self.webhook.apply_env_overrides();
        self.logging.apply_env_overrides();
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.port == 0 {
            return Err(ConfigError::Invalid("api.port cannot be 0".to_string()));
        }
        if self.api.websocket.max_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "api.websocket.max_queue_size cannot be 0".to_string(),
            ));
        }
        if self.api.websocket.event_queue_size == 0 {
            return Err(ConfigError::Invalid(
                "api.websocket.event_queue_size cannot be 0".to_string(),
            ));
        }
        if self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Maximum time to wait for components to drain, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ShutdownConfig {
    /// Returns the drain timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_shutdown_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shutdown.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = ServerConfig::default();
        config.api.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_queue() {
        let mut config = ServerConfig::default();
        config.api.websocket.max_queue_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_file_deserialization() {
        let json = r#"{
            "api": {"port": 9000},
            "webhook": {"secret": "s3cret"},
            "logging": {"level": "debug"}
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.shutdown.timeout_secs, 30);
    }
}
