//! # Beacon Store
//!
//! Durable, reconciling storage for workflow records.
//!
//! This crate provides [`WorkflowStore`], a SQLite-backed keyed store with
//! idempotent, order-tolerant merge semantics:
//! - at-most-one concurrent merge per composite key
//! - stale deltas are rejected, never applied, never reported as changes
//! - every accepted merge is committed before its outcome is returned
//!
//! The store knows nothing about HTTP or subscribers; it turns deltas into
//! [`beacon_core::MergeOutcome`]s and answers filtered snapshot queries.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod store;

pub use store::{ListQuery, StoreConfig, StoreError, WorkflowStore};
