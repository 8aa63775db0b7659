//! Configuration loading.
//!
//! This module provides:
//! - A format-detecting file loader (JSON and YAML)
//! - Cross-cutting configuration sections shared by several crates
//!   (webhook secret, logging)
//!
//! Component-specific sections live with their components: the API server
//! config in `beacon-api`, the store config in `beacon-store`. The server
//! binary composes them and applies `BEACON_*` environment overrides.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// JSON format (.json)
    #[default]
    Json,
    /// YAML format (.yaml, .yml)
    Yaml,
}

impl ConfigFormat {
    /// Detects the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_lowercase().as_str() {
                "json" => Some(Self::Json),
                "yaml" | "yml" => Some(Self::Yaml),
                _ => None,
            })
    }
}

/// Loads and deserializes a configuration file, detecting the format from
/// the file extension.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read, the extension is
/// not recognized, or the contents fail to parse.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| ConfigError::UnknownFormat(path.to_path_buf()))?;

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match format {
        ConfigFormat::Json => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        ConfigFormat::Yaml => serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}

/// Webhook ingestion configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret for signature verification. When absent, signature
    /// checking is skipped entirely; the server logs this insecure default
    /// loudly at startup instead of bypassing it silently.
    #[serde(default)]
    pub secret: Option<String>,
}

impl WebhookConfig {
    /// Returns true when inbound deliveries will be signature-checked.
    #[must_use]
    pub fn verifies_signatures(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("BEACON_WEBHOOK_SECRET") {
            self.secret = if secret.is_empty() { None } else { Some(secret) };
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter, `tracing` env-filter syntax.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON-formatted log lines instead of the human format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BEACON_LOG_LEVEL") {
            self.level = level;
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.yaml")),
            Some(ConfigFormat::Yaml)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("config.ini")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), None);
    }

    #[test]
    fn test_load_config_json() {
        let dir = std::env::temp_dir().join("beacon-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(br#"{"secret": "s3cret"}"#).unwrap();

        let config: WebhookConfig = load_config(&path).unwrap();
        assert_eq!(config.secret.as_deref(), Some("s3cret"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_config_unknown_format() {
        let result: Result<WebhookConfig, _> = load_config(Path::new("config.toml"));
        assert!(matches!(result, Err(ConfigError::UnknownFormat(_))));
    }

    #[test]
    fn test_webhook_config_verifies_signatures() {
        assert!(!WebhookConfig::default().verifies_signatures());
        assert!(!WebhookConfig {
            secret: Some(String::new())
        }
        .verifies_signatures());
        assert!(WebhookConfig {
            secret: Some("s".to_string())
        }
        .verifies_signatures());
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json);
    }
}
