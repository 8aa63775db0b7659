//! WebSocket message types.
//!
//! This module defines the message types for WebSocket communication:
//! - Client messages (subscribe, ping)
//! - Server messages (workflow updates, pong, errors, heartbeat)

use serde::{Deserialize, Serialize};

use beacon_core::filter::FilterSpec;
use beacon_core::record::WorkflowRecord;

/// Client-to-server message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Register or replace the subscriber's filter
    Subscribe {
        /// Filter applied to pushed records
        #[serde(default)]
        filter: FilterSpec,
        /// Subscriber's UTC offset in minutes (browser convention,
        /// positive west of UTC)
        #[serde(default)]
        utc_offset: i32,
    },
    /// Ping message (client heartbeat)
    Ping {
        /// Optional timestamp for latency measurement
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

/// Server-to-client message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription confirmation
    Subscribed {
        /// The filter now in effect
        filter: FilterSpec,
    },
    /// A workflow record changed in a newsworthy way
    WorkflowUpdate {
        /// The full post-merge record
        data: WorkflowRecord,
    },
    /// Pong response (server heartbeat)
    Pong {
        /// Echo back client timestamp
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
        /// Server timestamp
        server_time: i64,
    },
    /// Error message
    Error {
        /// Error code
        code: String,
        /// Error message
        message: String,
    },
    /// Server heartbeat (sent periodically)
    Heartbeat {
        /// Server timestamp
        server_time: i64,
    },
}
