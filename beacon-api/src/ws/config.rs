//! WebSocket server configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Heartbeat interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Connection timeout in seconds (no client traffic)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Maximum number of queued messages per subscriber. A subscriber
    /// that falls this far behind is dropped.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Capacity of the hub's inbound merge-outcome queue
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            connection_timeout_secs: default_connection_timeout(),
            max_queue_size: default_max_queue_size(),
            event_queue_size: default_event_queue_size(),
        }
    }
}

impl WsConfig {
    /// Returns the heartbeat interval as a Duration.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns the connection timeout as a Duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_connection_timeout() -> u64 {
    90
}

fn default_max_queue_size() -> usize {
    256
}

fn default_event_queue_size() -> usize {
    1024
}
