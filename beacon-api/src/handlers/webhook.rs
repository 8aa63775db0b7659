//! Webhook intake handler.
//!
//! The single write path of the service:
//!
//! 1. Verify the `X-Hub-Signature-256` header (when a secret is set)
//! 2. Classify the `X-GitHub-Event` header
//! 3. Normalize the body into a merge candidate
//! 4. Merge through the reconciling store
//!
//! A `200` means the delivery is durably merged (or recognized and
//! deliberately ignored); GitHub retries anything else. The store itself
//! pushes newsworthy outcomes to the fan-out hub under its per-key lock,
//! so racing deliveries for one key can never reach subscribers with an
//! older version behind a newer one.

use axum::{body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use beacon_core::record::MergeKind;

use crate::error::{ApiError, ApiResult};
use crate::ingest::{self, EventKind, IngestError};
use crate::response::ApiResponse;
use crate::state::AppState;

/// Header carrying the event type.
const EVENT_HEADER: &str = "x-github-event";
/// Header carrying the HMAC signature.
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Outcome summary returned to the delivery agent.
#[derive(Debug, Serialize)]
pub struct WebhookReceipt {
    /// What happened to the delivery: `created`, `updated`, `stale`,
    /// or `ignored`.
    pub outcome: &'static str,
}

/// Webhook intake handler.
///
/// POST /api/v1/webhook
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ApiResponse<WebhookReceipt>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    state
        .verifier
        .verify(&body, signature)
        .map_err(|e| {
            warn!(error = %e, "Rejecting webhook delivery");
            ApiError::Unauthorized(e.to_string())
        })?;

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing X-GitHub-Event header".to_string()))?;

    let kind = EventKind::from_header(event);
    if let EventKind::Unsupported(name) = &kind {
        debug!(event = %name, "Ignoring unsupported event type");
        return Ok(ApiResponse::success_with_message(
            WebhookReceipt { outcome: "ignored" },
            format!("Event type not ingested: {name}"),
        ));
    }

    let delta = ingest::normalize(&kind, &body, chrono::Utc::now()).map_err(|e| match e {
        IngestError::InvalidJson(_) | IngestError::SchemaViolation { .. } => {
            ApiError::BadRequest(e.to_string())
        }
    })?;

    let key = delta.key.clone();
    let outcome = state.store.merge(delta).await?;

    let summary = match outcome.kind {
        MergeKind::Created => "created",
        MergeKind::Updated => "updated",
        MergeKind::Stale => "stale",
    };
    info!(
        %key,
        outcome = summary,
        version = outcome.record.version,
        "Webhook delivery merged"
    );

    Ok(ApiResponse::success(WebhookReceipt { outcome: summary }))
}
