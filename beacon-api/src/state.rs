//! Application state for the API server.

use std::sync::Arc;
use std::time::Instant;

use beacon_store::WorkflowStore;

use crate::config::ApiConfig;
use crate::signature::SignatureVerifier;
use crate::ws::ConnectionRegistry;

/// Shared application state.
pub struct AppState {
    /// API configuration
    pub config: ApiConfig,
    /// Reconciling workflow store
    pub store: Arc<WorkflowStore>,
    /// Webhook signature verifier
    pub verifier: SignatureVerifier,
    /// WebSocket connection registry
    pub registry: Arc<ConnectionRegistry>,
    /// Server start time
    started_at: Instant,
}

impl AppState {
    /// Creates a new application state.
    ///
    /// The store is expected to carry the fan-out hub's event sink (see
    /// `WorkflowStore::with_event_sink`); the API layer itself never
    /// publishes, it only serves reads and hands deliveries to the store.
    #[must_use]
    pub fn new(
        config: ApiConfig,
        store: Arc<WorkflowStore>,
        verifier: SignatureVerifier,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            config,
            store,
            verifier,
            registry,
            started_at: Instant::now(),
        }
    }

    /// Returns seconds since the server started.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_store::StoreConfig;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_uptime_starts_near_zero() {
        let store = WorkflowStore::open(&StoreConfig {
            path: PathBuf::from(":memory:"),
        })
        .unwrap();
        let state = AppState::new(
            ApiConfig::default(),
            Arc::new(store),
            SignatureVerifier::new(None),
            Arc::new(ConnectionRegistry::new()),
        );

        assert!(state.uptime_secs() < 5);
    }
}
