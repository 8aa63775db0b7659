//! API route definitions.
//!
//! This module defines all API routes and their handlers.

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsConfig;
use crate::handlers::{health, webhook, workflows};
use crate::state::AppState;
use crate::ws::ws_handler;

/// Creates the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.cors);

    let api_routes = Router::new()
        .route("/webhook", post(webhook::receive_webhook))
        .route("/workflows", get(workflows::list_workflows))
        .route("/health", get(health::health_check))
        .route("/info", get(health::service_info));

    let ws_routes = Router::new().route("/ws", get(ws_handler));

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(ws_routes)
        .layer(cors)
        .with_state(state)
}

/// Builds the CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    if !config.enabled {
        return CorsLayer::new();
    }

    let mut cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allowed_origins.is_empty() {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    cors.max_age(std::time::Duration::from_secs(config.max_age_secs))
}
