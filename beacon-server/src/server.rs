//! Main server implementation.
//!
//! Wires the store, fan-out hub, and API server together and runs them
//! until a shutdown signal arrives.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use beacon_api::ws::{ConnectionRegistry, FanoutHub};
use beacon_api::{ApiError, ApiServer, AppState, SignatureVerifier};
use beacon_store::{StoreError, WorkflowStore};

use crate::config::ServerConfig;
use crate::shutdown::{ShutdownController, setup_signal_handlers};

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration could not be loaded or validated.
    #[error("Configuration error: {0}")]
    Config(#[from] beacon_core::error::ConfigError),

    /// Storage could not be opened.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// API server failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The Beacon server.
pub struct BeaconServer {
    config: ServerConfig,
    shutdown: ShutdownController,
}

impl BeaconServer {
    /// Creates a server from validated configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownController::new(),
        }
    }

    /// Returns the shutdown controller, for external coordination.
    #[must_use]
    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    /// Runs the server until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the store cannot be opened or the API
    /// server fails to bind.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting Beacon server");

        // The store carries the hub's event sink so merge outcomes enter
        // the queue under the per-key lock, in version order.
        let (events_tx, events_rx) =
            mpsc::channel(self.config.api.websocket.event_queue_size);
        let store = Arc::new(
            WorkflowStore::open(&self.config.storage)?.with_event_sink(events_tx),
        );
        info!(path = %self.config.storage.path.display(), "Storage opened");

        let verifier = SignatureVerifier::new(self.config.webhook.secret.clone());
        if verifier.is_enabled() {
            info!("Webhook signature verification enabled");
        } else {
            warn!("No webhook secret configured, accepting unsigned deliveries");
        }

        let registry = Arc::new(ConnectionRegistry::new());
        let hub = FanoutHub::new(
            registry.clone(),
            events_rx,
            self.config.api.websocket.clone(),
        );
        let hub_task = tokio::spawn(hub.run());

        let state = Arc::new(AppState::new(
            self.config.api.clone(),
            store,
            verifier,
            registry,
        ));

        // Signal handling
        let shutdown_ctrl = self.shutdown.clone();
        tokio::spawn(async move {
            setup_signal_handlers(shutdown_ctrl).await;
        });

        let shutdown = self.shutdown.clone();
        let shutdown_signal = async move {
            shutdown.wait_for_shutdown().await;
        };

        // Run until the signal, then let in-flight connections drain for
        // at most the configured shutdown timeout.
        let serve = ApiServer::new(state).run_with_shutdown(shutdown_signal);
        tokio::pin!(serve);

        let drain_timeout = self.config.shutdown.timeout();
        let drain_expired = {
            let shutdown = self.shutdown.clone();
            async move {
                shutdown.wait_for_shutdown().await;
                tokio::time::sleep(drain_timeout).await;
            }
        };

        let result = tokio::select! {
            result = &mut serve => result,
            () = drain_expired => {
                warn!(?drain_timeout, "Drain timeout exceeded, abandoning open connections");
                Ok(())
            }
        };

        hub_task.abort();
        self.shutdown.mark_complete();
        info!("Beacon server stopped");

        result.map_err(ServerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_server_shuts_down_on_signal() {
        let config = ServerConfig {
            api: beacon_api::ApiConfig {
                host: "127.0.0.1".to_string(),
                // Port 0 binds an ephemeral port; skip validation here
                // since this test only exercises the shutdown path.
                port: 0,
                ..Default::default()
            },
            storage: beacon_store::StoreConfig {
                path: PathBuf::from(":memory:"),
            },
            ..Default::default()
        };

        let server = BeaconServer::new(config);
        let controller = server.shutdown_controller().clone();

        let run = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.initiate_shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), run).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_server_exits_within_drain_timeout() {
        let config = ServerConfig {
            api: beacon_api::ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                ..Default::default()
            },
            storage: beacon_store::StoreConfig {
                path: PathBuf::from(":memory:"),
            },
            shutdown: crate::config::ShutdownConfig { timeout_secs: 0 },
            ..Default::default()
        };

        let server = BeaconServer::new(config);
        let controller = server.shutdown_controller().clone();

        let run = tokio::spawn(server.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.initiate_shutdown();

        // With a zero drain budget the server must come down promptly even
        // if a connection were still open.
        let result = tokio::time::timeout(Duration::from_secs(2), run).await;
        assert!(result.is_ok());
    }
}
