//! # Beacon API
//!
//! HTTP and WebSocket surface for the Beacon CI workflow relay.
//!
//! This crate provides:
//! - Webhook ingestion endpoint with HMAC signature verification
//! - Filtered workflow snapshot queries
//! - WebSocket fan-out of workflow state changes
//! - Health and service info endpoints
//!
//! # Architecture
//!
//! The API layer is built on Axum and provides:
//! - `POST /api/v1/webhook` - Webhook delivery intake
//! - `GET /api/v1/workflows` - Filtered workflow snapshot
//! - `GET /api/v1/health` - Health check with storage probe
//! - `GET /api/v1/info` - Service metadata
//! - `/ws` - WebSocket endpoint for real-time workflow updates
//!
//! # Fan-out
//!
//! Accepted merges that create a record or change its conclusion flow
//! through a single hub task into per-subscriber bounded queues. Each
//! subscriber registers a filter; only matching records are pushed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod response;
pub mod routes;
pub mod server;
pub mod signature;
pub mod state;
pub mod ws;

pub use config::ApiConfig;
pub use error::ApiError;
pub use server::ApiServer;
pub use signature::SignatureVerifier;
pub use state::AppState;
pub use ws::{ConnectionRegistry, FanoutHub, WsConfig};
