//! # Beacon Core
//!
//! Core domain types for the Beacon CI workflow relay.
//!
//! This crate provides:
//! - The canonical [`record::WorkflowRecord`] and its composite key
//! - Merge deltas and outcomes used by the reconciling store
//! - The pure filter engine shared by the query and broadcast paths
//! - Configuration loading with environment variable overrides
//!
//! # Design
//!
//! Everything in this crate is a plain value type: no I/O, no locks, no
//! async. The store and API crates build the pipeline out of these pieces.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod filter;
pub mod record;

pub use config::{ConfigFormat, LoggingConfig, WebhookConfig, load_config};
pub use error::ConfigError;
pub use filter::{FilterSpec, StatusFilter, TimeRange};
pub use record::{Conclusion, MergeKind, MergeOutcome, WorkflowDelta, WorkflowKey, WorkflowRecord};
