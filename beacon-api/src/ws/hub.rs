//! Fan-out hub task.
//!
//! A single task drains merge outcomes from the ingestion path and pushes
//! them through the [`ConnectionRegistry`]. Routing everything through one
//! task keeps the per-subscriber queues FIFO, which is what guarantees a
//! subscriber never observes versions of one key going backwards.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use beacon_core::record::MergeOutcome;

use super::config::WsConfig;
use super::connection::ConnectionRegistry;

/// The broadcast hub.
pub struct FanoutHub {
    registry: Arc<ConnectionRegistry>,
    events: mpsc::Receiver<MergeOutcome>,
    config: WsConfig,
}

impl FanoutHub {
    /// Creates a hub draining the given event queue.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        events: mpsc::Receiver<MergeOutcome>,
        config: WsConfig,
    ) -> Self {
        Self {
            registry,
            events,
            config,
        }
    }

    /// Runs the hub until the event channel closes.
    ///
    /// Alongside broadcasting, the hub owns connection upkeep: periodic
    /// heartbeats and eviction of connections with no client traffic.
    pub async fn run(mut self) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        let timeout = self.config.connection_timeout();

        info!("Fan-out hub started");

        loop {
            tokio::select! {
                outcome = self.events.recv() => {
                    let Some(outcome) = outcome else { break };
                    debug!(
                        key = %outcome.record.key,
                        version = outcome.record.version,
                        "Broadcasting workflow update"
                    );
                    self.registry.fanout(&outcome, chrono::Utc::now());
                }
                _ = heartbeat.tick() => {
                    self.registry.send_heartbeat();
                    for id in self.registry.get_timed_out_connections(timeout) {
                        warn!(%id, "Connection timed out, dropping");
                        self.registry.unregister(id);
                    }
                }
            }
        }

        info!("Fan-out hub stopped");
    }
}
