//! # Beacon Server
//!
//! Server entry point for the Beacon CI workflow relay.
//!
//! This crate provides:
//! - Service startup and component wiring
//! - Configuration composition with environment overrides
//! - Logging initialization
//! - Graceful shutdown handling
//!
//! # Architecture
//!
//! The server wires the pipeline together:
//! - Opens the reconciling store (running pending migrations)
//! - Spawns the fan-out hub with its bounded event queue
//! - Starts the API server (webhook intake, queries, WebSocket)
//! - Coordinates shutdown on SIGINT/SIGTERM

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod logging;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::{BeaconServer, ServerError};
pub use shutdown::ShutdownController;
