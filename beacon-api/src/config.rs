//! API configuration types.
//!
//! This module provides configuration for the API server including:
//! - Server binding address and port
//! - CORS settings
//! - WebSocket settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ws::WsConfig;

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS configuration
    #[serde(default)]
    pub cors: CorsConfig,

    /// WebSocket configuration
    #[serde(default)]
    pub websocket: WsConfig,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: CorsConfig::default(),
            websocket: WsConfig::default(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    /// Returns the server bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BEACON_API_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("BEACON_API_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed origins (empty means all origins)
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Max age for preflight cache in seconds
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec![],
            max_age_secs: default_max_age(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_age() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.cors.enabled);
    }

    #[test]
    fn test_bind_address() {
        let config = ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Default::default()
        };
        assert_eq!(config.bind_address(), "127.0.0.1:3000");
    }

    #[test]
    fn test_request_timeout() {
        let config = ApiConfig {
            request_timeout_secs: 15,
            ..Default::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_config_partial_deserialization() {
        let config: ApiConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
    }
}
