//! Health check and service info handlers.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Component statuses
    pub components: ComponentStatus,
}

/// Component status.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    /// API server status
    pub api: &'static str,
    /// Storage status
    pub storage: &'static str,
    /// Number of live WebSocket subscribers
    pub subscribers: usize,
}

/// Health check handler.
///
/// GET /api/v1/health
///
/// Probes storage connectivity; a failed probe degrades the service to
/// `503` so load balancers stop routing deliveries here.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage_ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Storage health probe failed");
            false
        }
    };

    let response = HealthResponse {
        status: if storage_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        components: ComponentStatus {
            api: "healthy",
            storage: if storage_ok { "healthy" } else { "unavailable" },
            subscribers: state.registry.connection_count(),
        },
    };

    let status = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Service info response.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    /// Service name
    pub service: &'static str,
    /// Service version
    pub version: &'static str,
    /// Whether webhook deliveries are signature-checked
    pub signature_verification: bool,
    /// Endpoint map
    pub endpoints: Endpoints,
}

/// Endpoint map for the info response.
#[derive(Debug, Serialize)]
pub struct Endpoints {
    /// Webhook intake
    pub webhook: &'static str,
    /// Workflow snapshot query
    pub workflows: &'static str,
    /// Health check
    pub health: &'static str,
    /// WebSocket endpoint
    pub websocket: &'static str,
}

/// Service info handler.
///
/// GET /api/v1/info
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        service: "beacon",
        version: env!("CARGO_PKG_VERSION"),
        signature_verification: state.verifier.is_enabled(),
        endpoints: Endpoints {
            webhook: "POST /api/v1/webhook",
            workflows: "GET /api/v1/workflows",
            health: "GET /api/v1/health",
            websocket: "GET /ws",
        },
    })
}
