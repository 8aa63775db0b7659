//! Webhook payload normalization.
//!
//! This module turns raw GitHub delivery bodies into [`WorkflowDelta`]s:
//! - `workflow_run` events key on `(repository, workflow_id, run id)`
//! - `workflow_job` events key on the job id with no run number, so
//!   their provisional state always yields to a later run event
//!
//! Timestamps are taken from the payload where present; a delta carries
//! the observation time only when the payload has none. Redelivered
//! payloads therefore reproduce the same freshness pair and merge as
//! stale.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use beacon_core::record::{Conclusion, WorkflowDelta, WorkflowKey};

/// Recognized webhook event kinds, from the `X-GitHub-Event` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A `workflow_run` event.
    WorkflowRun,
    /// A `workflow_job` event.
    WorkflowJob,
    /// Any other event type; acknowledged but not ingested.
    Unsupported(String),
}

impl EventKind {
    /// Classifies the `X-GitHub-Event` header value.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        match value {
            "workflow_run" => Self::WorkflowRun,
            "workflow_job" => Self::WorkflowJob,
            other => Self::Unsupported(other.to_string()),
        }
    }
}

/// Normalization errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Body is not valid JSON.
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// Required fields are absent from the payload.
    #[error("Missing required fields: {}", fields.join(", "))]
    SchemaViolation {
        /// Names of the missing fields, payload-relative.
        fields: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    repository: Option<RepositoryPayload>,
    workflow_run: Option<RunPayload>,
    workflow_job: Option<JobPayload>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunPayload {
    id: Option<i64>,
    workflow_id: Option<i64>,
    name: Option<String>,
    run_number: Option<i64>,
    conclusion: Option<String>,
    status: Option<String>,
    html_url: Option<String>,
    head_branch: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct JobPayload {
    id: Option<i64>,
    run_id: Option<i64>,
    name: Option<String>,
    workflow_name: Option<String>,
    conclusion: Option<String>,
    status: Option<String>,
    run_url: Option<String>,
    head_branch: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// Normalizes a raw delivery body into a merge candidate.
///
/// `observed_at` is used as the delta timestamp only when the payload
/// itself carries no usable timestamp.
///
/// # Errors
///
/// Returns [`IngestError`] when the body is not JSON or required fields
/// are missing. Callers must route [`EventKind::Unsupported`] around this
/// function; it only handles the two ingested event kinds.
pub fn normalize(
    kind: &EventKind,
    body: &[u8],
    observed_at: DateTime<Utc>,
) -> Result<WorkflowDelta, IngestError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| IngestError::InvalidJson(e.to_string()))?;

    let repository = envelope
        .repository
        .and_then(|r| r.full_name)
        .filter(|n| !n.is_empty());

    match kind {
        EventKind::WorkflowRun => normalize_run(envelope.workflow_run, repository, observed_at),
        EventKind::WorkflowJob => normalize_job(envelope.workflow_job, repository, observed_at),
        EventKind::Unsupported(name) => Err(IngestError::SchemaViolation {
            fields: vec![format!("unsupported event type: {name}")],
        }),
    }
}

fn normalize_run(
    run: Option<RunPayload>,
    repository: Option<String>,
    observed_at: DateTime<Utc>,
) -> Result<WorkflowDelta, IngestError> {
    let Some(run) = run else {
        return Err(missing(&["workflow_run"]));
    };

    let mut fields = Vec::new();
    if repository.is_none() {
        fields.push("repository.full_name");
    }
    if run.id.is_none() {
        fields.push("workflow_run.id");
    }
    if run.workflow_id.is_none() {
        fields.push("workflow_run.workflow_id");
    }
    if run.name.is_none() {
        fields.push("workflow_run.name");
    }
    if !fields.is_empty() {
        return Err(missing(&fields));
    }

    // Checked above; the destructuring cannot fail.
    let (Some(repository), Some(run_id), Some(workflow_id), Some(name)) =
        (repository, run.id, run.workflow_id, run.name)
    else {
        return Err(missing(&["workflow_run"]));
    };

    Ok(WorkflowDelta {
        key: WorkflowKey {
            repository,
            workflow_id,
            run_id: Some(run_id),
        },
        workflow_name: name,
        conclusion: parse_conclusion(run.conclusion.as_deref(), run.status.as_deref()),
        run_number: run.run_number,
        run_url: run.html_url,
        head_branch: run.head_branch,
        updated_at: run.updated_at.unwrap_or(observed_at),
    })
}

fn normalize_job(
    job: Option<JobPayload>,
    repository: Option<String>,
    observed_at: DateTime<Utc>,
) -> Result<WorkflowDelta, IngestError> {
    let Some(job) = job else {
        return Err(missing(&["workflow_job"]));
    };

    let mut fields = Vec::new();
    if repository.is_none() {
        fields.push("repository.full_name");
    }
    if job.id.is_none() {
        fields.push("workflow_job.id");
    }
    if job.workflow_name.is_none() && job.name.is_none() {
        fields.push("workflow_job.workflow_name");
    }
    if !fields.is_empty() {
        return Err(missing(&fields));
    }

    let (Some(repository), Some(job_id)) = (repository, job.id) else {
        return Err(missing(&["workflow_job"]));
    };
    let workflow_name = match (job.workflow_name, job.name) {
        (Some(name), _) | (None, Some(name)) => name,
        (None, None) => return Err(missing(&["workflow_job.workflow_name"])),
    };

    Ok(WorkflowDelta {
        // The job id occupies the workflow id slot so job lineages never
        // collide with run lineages for the same workflow.
        key: WorkflowKey {
            repository,
            workflow_id: job_id,
            run_id: job.run_id,
        },
        workflow_name,
        conclusion: parse_conclusion(job.conclusion.as_deref(), job.status.as_deref()),
        run_number: None,
        run_url: job.run_url,
        head_branch: job.head_branch,
        updated_at: job.completed_at.or(job.started_at).unwrap_or(observed_at),
    })
}

fn parse_conclusion(conclusion: Option<&str>, status: Option<&str>) -> Option<Conclusion> {
    // A null conclusion with an in-flight status is a pending run.
    conclusion
        .and_then(Conclusion::parse)
        .or_else(|| status.and_then(Conclusion::parse))
}

fn missing(fields: &[&str]) -> IngestError {
    IngestError::SchemaViolation {
        fields: fields.iter().map(ToString::to_string).collect(),
    }
}
