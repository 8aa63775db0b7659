//! WebSocket connection management.
//!
//! This module provides connection state tracking and the registry the
//! hub fans out through:
//! - Per-connection state (phase, filter, outbound queue)
//! - Connection registry with filtered broadcast
//! - Heartbeat tracking

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::warn;

use beacon_core::filter::FilterSpec;
use beacon_core::record::MergeOutcome;

use super::message::ServerMessage;

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the inner ID value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle phase of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberPhase {
    /// Socket open, no filter registered yet; receives nothing.
    Connecting,
    /// Filter registered; receives matching updates.
    Active,
    /// Dropped for falling behind; no further pushes.
    Closing,
}

/// State of a single WebSocket connection.
#[derive(Debug)]
pub struct ConnectionState {
    /// Connection ID
    pub id: ConnectionId,
    /// Lifecycle phase
    pub phase: SubscriberPhase,
    /// Filter applied to pushed records
    pub filter: FilterSpec,
    /// Subscriber's UTC offset in minutes
    pub utc_offset: i32,
    /// Last client traffic received
    pub last_heartbeat: Instant,
    /// Message sender channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionState {
    /// Creates a new connection state in the `Connecting` phase.
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id,
            phase: SubscriberPhase::Connecting,
            filter: FilterSpec::default(),
            utc_offset: 0,
            last_heartbeat: Instant::now(),
            sender,
        }
    }

    /// Registers (or replaces) the subscriber's filter and activates it.
    pub fn activate(&mut self, filter: FilterSpec, utc_offset: i32) {
        self.filter = filter;
        self.utc_offset = utc_offset;
        self.phase = SubscriberPhase::Active;
    }

    /// Returns true if the subscriber receives pushes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == SubscriberPhase::Active
    }

    /// Updates the last heartbeat time.
    pub fn update_heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    /// Returns the time since last heartbeat.
    #[must_use]
    pub fn time_since_heartbeat(&self) -> std::time::Duration {
        self.last_heartbeat.elapsed()
    }
}

/// Registry of all active WebSocket connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    /// Active connections by ID
    connections: DashMap<ConnectionId, Arc<parking_lot::RwLock<ConnectionState>>>,
}

impl ConnectionRegistry {
    /// Creates a new connection registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Registers a new connection.
    pub fn register(&self, state: ConnectionState) -> Arc<parking_lot::RwLock<ConnectionState>> {
        let id = state.id;
        let state = Arc::new(parking_lot::RwLock::new(state));
        self.connections.insert(id, state.clone());
        state
    }

    /// Unregisters a connection.
    pub fn unregister(&self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Returns the number of active connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Pushes a merge outcome to every active subscriber whose filter
    /// matches the post-merge record.
    ///
    /// Queues are bounded and never awaited: a subscriber whose queue is
    /// full is dropped from the registry so one slow reader cannot hold
    /// back the rest.
    pub fn fanout(&self, outcome: &MergeOutcome, now: DateTime<Utc>) {
        let mut dropped = Vec::new();

        for entry in self.connections.iter() {
            let sender = {
                let state = entry.value().read();
                if state.is_active()
                    && state.filter.matches(&outcome.record, now, state.utc_offset)
                {
                    Some(state.sender.clone())
                } else {
                    None
                }
            };
            let Some(sender) = sender else { continue };

            let message = ServerMessage::WorkflowUpdate {
                data: outcome.record.clone(),
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(message) {
                entry.value().write().phase = SubscriberPhase::Closing;
                dropped.push(*entry.key());
            }
        }

        for id in dropped {
            warn!(%id, "Subscriber queue overflow, dropping connection");
            self.unregister(id);
        }
    }

    /// Returns connections that have timed out.
    pub fn get_timed_out_connections(&self, timeout: std::time::Duration) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter_map(|entry| {
                let state = entry.value().read();
                if state.time_since_heartbeat() > timeout {
                    Some(state.id)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Sends a heartbeat to all connections. Best effort; a full queue
    /// simply misses one beat.
    pub fn send_heartbeat(&self) {
        let server_time = chrono::Utc::now().timestamp_millis();

        for entry in self.connections.iter() {
            let sender = entry.value().read().sender.clone();
            let _ = sender.try_send(ServerMessage::Heartbeat { server_time });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::filter::StatusFilter;
    use beacon_core::record::{Conclusion, MergeKind, WorkflowKey, WorkflowRecord};
    use chrono::TimeZone;

    fn outcome(conclusion: Option<Conclusion>) -> MergeOutcome {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        MergeOutcome {
            kind: MergeKind::Created,
            status_changed: false,
            record: WorkflowRecord {
                key: WorkflowKey {
                    repository: "org/repo".to_string(),
                    workflow_id: 1,
                    run_id: Some(10),
                },
                workflow_name: "CI".to_string(),
                conclusion,
                run_number: Some(1),
                run_url: None,
                head_branch: None,
                created_at: now,
                updated_at: now,
                version: 1,
            },
        }
    }

    #[test]
    fn test_connection_id_generate() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId(42);
        assert_eq!(format!("{id}"), "conn-42");
    }

    #[tokio::test]
    async fn test_connection_state_phases() {
        let (tx, _rx) = mpsc::channel(10);
        let mut state = ConnectionState::new(ConnectionId::generate(), tx);

        assert_eq!(state.phase, SubscriberPhase::Connecting);
        assert!(!state.is_active());

        state.activate(FilterSpec::default(), 300);
        assert!(state.is_active());
        assert_eq!(state.utc_offset, 300);
    }

    #[tokio::test]
    async fn test_registry_register_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(10);
        let id = ConnectionId::generate();

        registry.register(ConnectionState::new(id, tx));
        assert_eq!(registry.connection_count(), 1);

        registry.unregister(id);
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_fanout_skips_connecting_subscribers() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(10);
        registry.register(ConnectionState::new(ConnectionId::generate(), tx));

        registry.fanout(&outcome(Some(Conclusion::Success)), Utc::now());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fanout_respects_filter() {
        let registry = ConnectionRegistry::new();

        let (tx_fail, mut rx_fail) = mpsc::channel(10);
        let mut wants_failures = ConnectionState::new(ConnectionId::generate(), tx_fail);
        wants_failures.activate(
            FilterSpec {
                status: StatusFilter::Failure,
                ..Default::default()
            },
            0,
        );
        registry.register(wants_failures);

        let (tx_all, mut rx_all) = mpsc::channel(10);
        let mut wants_all = ConnectionState::new(ConnectionId::generate(), tx_all);
        wants_all.activate(FilterSpec::default(), 0);
        registry.register(wants_all);

        registry.fanout(&outcome(Some(Conclusion::Success)), Utc::now());

        assert!(rx_fail.try_recv().is_err());
        assert!(matches!(
            rx_all.try_recv(),
            Ok(ServerMessage::WorkflowUpdate { .. })
        ));
    }

    #[tokio::test]
    async fn test_fanout_drops_overflowing_subscriber() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let mut state = ConnectionState::new(ConnectionId::generate(), tx);
        state.activate(FilterSpec::default(), 0);
        registry.register(state);

        // First push fills the queue, second overflows it.
        registry.fanout(&outcome(Some(Conclusion::Success)), Utc::now());
        assert_eq!(registry.connection_count(), 1);

        registry.fanout(&outcome(Some(Conclusion::Failure)), Utc::now());
        assert_eq!(registry.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_reaches_all_connections() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(10);
        registry.register(ConnectionState::new(ConnectionId::generate(), tx));

        registry.send_heartbeat();
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::Heartbeat { .. })
        ));
    }

    #[tokio::test]
    async fn test_timed_out_connections() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::channel(10);
        let id = ConnectionId::generate();
        registry.register(ConnectionState::new(id, tx));

        let stale = registry.get_timed_out_connections(std::time::Duration::ZERO);
        assert_eq!(stale, vec![id]);

        let fresh = registry.get_timed_out_connections(std::time::Duration::from_secs(60));
        assert!(fresh.is_empty());
    }
}
