//! API server implementation.
//!
//! This module provides the main API server that handles HTTP requests.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::routes::create_router;
use crate::state::AppState;

/// API server.
pub struct ApiServer {
    /// Application state
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a new API server over pre-built application state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Returns a reference to the application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Runs the API server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or run.
    pub async fn run(self) -> Result<(), ApiError> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Runs the API server with graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or run.
    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ApiError> {
        let addr = self.state.config.bind_address();

        // The timeout bounds the response future only; WebSocket upgrades
        // complete quickly and the upgraded stream is not affected.
        let app = create_router(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(self.state.config.request_timeout()));

        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| ApiError::Internal(format!("Invalid bind address: {e}")))?;

        let listener = TcpListener::bind(socket_addr)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to bind to {addr}: {e}")))?;

        info!("API server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ApiError::Internal(format!("Server error: {e}")))?;

        warn!("API server shutting down");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::signature::SignatureVerifier;
    use crate::ws::ConnectionRegistry;
    use beacon_store::{StoreConfig, WorkflowStore};
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_api_server_holds_state() {
        let store = WorkflowStore::open(&StoreConfig {
            path: PathBuf::from(":memory:"),
        })
        .unwrap();
        let state = Arc::new(AppState::new(
            ApiConfig::default(),
            Arc::new(store),
            SignatureVerifier::new(None),
            Arc::new(ConnectionRegistry::new()),
        ));

        let server = ApiServer::new(state.clone());
        assert!(Arc::ptr_eq(server.state(), &state));
    }
}
