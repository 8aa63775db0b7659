//! Canonical workflow state types.
//!
//! This module defines the unit of state the whole pipeline agrees on:
//! - [`WorkflowKey`] — the composite identity of a run/job lineage
//! - [`WorkflowRecord`] — the latest merged state for one key
//! - [`WorkflowDelta`] — a normalized webhook event, candidate for merging
//! - [`MergeOutcome`] — what the reconciling store decided about a delta
//!
//! # Freshness
//!
//! Webhook delivery is at-least-once and unordered. A delta supersedes the
//! stored record only when its `(run_number, updated_at)` pair is strictly
//! greater (lexicographic); an absent `run_number` compares below any
//! present one. Equal freshness is a stale redelivery and never merges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Terminal or in-flight conclusion of a workflow run or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conclusion {
    /// Run completed successfully.
    Success,
    /// Run completed with a failure.
    Failure,
    /// Run was cancelled before completion.
    Cancelled,
    /// Run was skipped.
    Skipped,
    /// Run or job is still in flight.
    Pending,
}

impl fmt::Display for Conclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
            Self::Pending => "pending",
        };
        write!(f, "{s}")
    }
}

impl Conclusion {
    /// Parses a conclusion from its wire representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failure" | "failed" => Some(Self::Failure),
            "cancelled" => Some(Self::Cancelled),
            "skipped" => Some(Self::Skipped),
            "pending" | "in_progress" | "queued" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// Composite identity of a workflow lineage.
///
/// `run_id` is absent for job-only events whose parent run has not been
/// observed yet; such records live under a provisional sub-key (the job id
/// occupies the `workflow_id` slot) and are superseded once a
/// `workflow_run` event for the same lineage arrives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowKey {
    /// Repository full name, e.g. `org/repo`.
    pub repository: String,
    /// GitHub workflow id (or job id for job-only events).
    pub workflow_id: i64,
    /// Workflow run id, when known.
    pub run_id: Option<i64>,
}

impl fmt::Display for WorkflowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.run_id {
            Some(run_id) => write!(f, "{}/{}/{}", self.repository, self.workflow_id, run_id),
            None => write!(f, "{}/{}/-", self.repository, self.workflow_id),
        }
    }
}

/// Latest merged state for one workflow lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Composite key.
    #[serde(flatten)]
    pub key: WorkflowKey,
    /// Workflow name.
    pub workflow_name: String,
    /// Latest known conclusion; `None` while GitHub reports null.
    pub conclusion: Option<Conclusion>,
    /// Run number, monotonically non-decreasing per workflow.
    pub run_number: Option<i64>,
    /// Link to the run on GitHub.
    pub run_url: Option<String>,
    /// Branch the run executed on.
    pub head_branch: Option<String>,
    /// First-observed timestamp. Immutable after creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent accepted merge. Only moves forward.
    pub updated_at: DateTime<Utc>,
    /// Merge counter, incremented on every accepted merge. Only moves
    /// forward; the freshness authority for subscriber-facing ordering.
    pub version: u64,
}

impl WorkflowRecord {
    /// Freshness pair used to decide whether a delta supersedes this record.
    #[must_use]
    pub fn freshness(&self) -> (Option<i64>, DateTime<Utc>) {
        (self.run_number, self.updated_at)
    }
}

/// A normalized webhook event, candidate for merging into the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDelta {
    /// Composite key this delta targets.
    pub key: WorkflowKey,
    /// Workflow name.
    pub workflow_name: String,
    /// Conclusion carried by the event.
    pub conclusion: Option<Conclusion>,
    /// Run number, absent for job events.
    pub run_number: Option<i64>,
    /// Link to the run on GitHub.
    pub run_url: Option<String>,
    /// Branch the run executed on.
    pub head_branch: Option<String>,
    /// Update timestamp carried by the payload (or observation time when
    /// the payload has none). Freshness tiebreak within a run number.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDelta {
    /// Freshness pair of this delta.
    #[must_use]
    pub fn freshness(&self) -> (Option<i64>, DateTime<Utc>) {
        (self.run_number, self.updated_at)
    }

    /// Returns true if this delta strictly supersedes the given record.
    ///
    /// Equal freshness is a redelivery and does not supersede.
    #[must_use]
    pub fn supersedes(&self, record: &WorkflowRecord) -> bool {
        self.freshness().cmp(&record.freshness()) == Ordering::Greater
    }
}

/// How the reconciling store classified a merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeKind {
    /// First observation of the key; record inserted with `version = 1`.
    Created,
    /// Delta superseded the stored record; `version` incremented.
    Updated,
    /// Delta was equal or older than the stored record; nothing changed.
    Stale,
}

/// Outcome of a single merge, carrying the post-merge record.
///
/// For `Stale` outcomes the record is the untouched stored state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Classification of the merge.
    pub kind: MergeKind,
    /// Whether the accepted merge changed `conclusion`.
    pub status_changed: bool,
    /// The record as stored after the merge decision.
    pub record: WorkflowRecord,
}

impl MergeOutcome {
    /// Returns true if this outcome should be pushed to subscribers.
    ///
    /// Creations and conclusion transitions are newsworthy; cosmetic
    /// refreshes and stale redeliveries are not.
    #[must_use]
    pub fn should_broadcast(&self) -> bool {
        match self.kind {
            MergeKind::Created => true,
            MergeKind::Updated => self.status_changed,
            MergeKind::Stale => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(run_number: Option<i64>, updated_secs: i64) -> WorkflowRecord {
        WorkflowRecord {
            key: WorkflowKey {
                repository: "org/repo".to_string(),
                workflow_id: 42,
                run_id: Some(1000),
            },
            workflow_name: "CI".to_string(),
            conclusion: Some(Conclusion::Pending),
            run_number,
            run_url: None,
            head_branch: Some("main".to_string()),
            created_at: ts(0),
            updated_at: ts(updated_secs),
            version: 1,
        }
    }

    fn delta(run_number: Option<i64>, updated_secs: i64) -> WorkflowDelta {
        WorkflowDelta {
            key: WorkflowKey {
                repository: "org/repo".to_string(),
                workflow_id: 42,
                run_id: Some(1000),
            },
            workflow_name: "CI".to_string(),
            conclusion: Some(Conclusion::Success),
            run_number,
            run_url: None,
            head_branch: Some("main".to_string()),
            updated_at: ts(updated_secs),
        }
    }

    #[test]
    fn test_conclusion_parse() {
        assert_eq!(Conclusion::parse("success"), Some(Conclusion::Success));
        assert_eq!(Conclusion::parse("failed"), Some(Conclusion::Failure));
        assert_eq!(Conclusion::parse("in_progress"), Some(Conclusion::Pending));
        assert_eq!(Conclusion::parse("exploded"), None);
    }

    #[test]
    fn test_conclusion_serde_lowercase() {
        let json = serde_json::to_string(&Conclusion::Success).unwrap();
        assert_eq!(json, "\"success\"");
    }

    #[test]
    fn test_key_display() {
        let key = WorkflowKey {
            repository: "org/repo".to_string(),
            workflow_id: 42,
            run_id: None,
        };
        assert_eq!(key.to_string(), "org/repo/42/-");
    }

    #[test]
    fn test_higher_run_number_supersedes() {
        assert!(delta(Some(6), 0).supersedes(&record(Some(5), 100)));
    }

    #[test]
    fn test_equal_freshness_is_stale() {
        assert!(!delta(Some(5), 100).supersedes(&record(Some(5), 100)));
    }

    #[test]
    fn test_same_run_number_later_timestamp_supersedes() {
        assert!(delta(Some(5), 101).supersedes(&record(Some(5), 100)));
        assert!(!delta(Some(5), 99).supersedes(&record(Some(5), 100)));
    }

    #[test]
    fn test_absent_run_number_compares_below_present() {
        // Provisional job state loses to the first workflow_run event.
        assert!(delta(Some(1), 0).supersedes(&record(None, 100)));
        assert!(!delta(None, 200).supersedes(&record(Some(1), 100)));
    }

    #[test]
    fn test_should_broadcast() {
        let mk = |kind, status_changed| MergeOutcome {
            kind,
            status_changed,
            record: record(Some(1), 0),
        };
        assert!(mk(MergeKind::Created, false).should_broadcast());
        assert!(mk(MergeKind::Updated, true).should_broadcast());
        assert!(!mk(MergeKind::Updated, false).should_broadcast());
        assert!(!mk(MergeKind::Stale, true).should_broadcast());
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let rec = record(Some(5), 100);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"repository\":\"org/repo\""));
        let parsed: WorkflowRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, parsed);
    }
}
