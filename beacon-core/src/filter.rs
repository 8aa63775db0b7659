//! Pure filter engine.
//!
//! One predicate, two call sites: the query façade filters snapshots with
//! the same [`FilterSpec::matches`] the fan-out hub uses to decide which
//! subscribers receive a push. Keeping it pure (record in, bool out) is
//! what guarantees the two paths can never disagree.
//!
//! # Timezone handling
//!
//! Records are stored in UTC. Callers supply a UTC offset in minutes with
//! browser `Date.getTimezoneOffset()` semantics (positive west of UTC),
//! converted exactly once here; everything downstream is wall-clock
//! arithmetic in the caller's reference timezone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{Conclusion, WorkflowRecord};

/// Time window a record's `updated_at` must fall into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    /// Within the last hour: `[now - 1h, now)`.
    LastHour,
    /// Since local midnight: `[start of today, now)`.
    CurrentDay,
    /// The whole previous local day.
    PreviousDay,
    /// The current week, Sunday 00:00 through Saturday 24:00.
    CurrentWeek,
    /// The week immediately before the current one.
    PreviousWeek,
    /// No time constraint.
    #[default]
    AllTime,
}

/// Conclusion constraint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    /// Any conclusion, including null.
    #[default]
    All,
    /// Successful runs only.
    Success,
    /// Failed runs only.
    Failure,
    /// Cancelled runs only.
    Cancelled,
    /// Skipped runs only.
    Skipped,
    /// In-flight runs: `pending` and null conclusions share this bucket.
    Pending,
}

impl StatusFilter {
    /// Returns true if the given conclusion satisfies this filter.
    ///
    /// A null conclusion only ever matches `All` and `Pending`.
    #[must_use]
    pub fn matches(&self, conclusion: Option<Conclusion>) -> bool {
        match self {
            Self::All => true,
            Self::Pending => matches!(conclusion, None | Some(Conclusion::Pending)),
            Self::Success => conclusion == Some(Conclusion::Success),
            Self::Failure => conclusion == Some(Conclusion::Failure),
            Self::Cancelled => conclusion == Some(Conclusion::Cancelled),
            Self::Skipped => conclusion == Some(Conclusion::Skipped),
        }
    }
}

/// A subscriber- or query-supplied filter over workflow records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Time window constraint.
    #[serde(default)]
    pub time_range: TimeRange,
    /// Conclusion constraint.
    #[serde(default)]
    pub status: StatusFilter,
}

impl FilterSpec {
    /// Evaluates this filter against a record.
    ///
    /// `now` is injected rather than read from the clock so the query and
    /// broadcast paths can evaluate a batch against one consistent instant
    /// (and so tests are deterministic). `utc_offset` is the caller's
    /// offset in minutes, browser convention.
    #[must_use]
    pub fn matches(&self, record: &WorkflowRecord, now: DateTime<Utc>, utc_offset: i32) -> bool {
        self.status.matches(record.conclusion)
            && in_time_range(self.time_range, record.updated_at, now, utc_offset)
    }
}

/// Converts a browser-style offset in minutes into a fixed timezone.
///
/// Out-of-range offsets fall back to UTC rather than failing the request.
fn reference_zone(utc_offset: i32) -> FixedOffset {
    FixedOffset::west_opt(utc_offset.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

fn in_time_range(range: TimeRange, updated_at: DateTime<Utc>, now: DateTime<Utc>, utc_offset: i32) -> bool {
    if range == TimeRange::AllTime {
        return true;
    }

    let zone = reference_zone(utc_offset);
    let local: NaiveDateTime = updated_at.with_timezone(&zone).naive_local();
    let local_now: NaiveDateTime = now.with_timezone(&zone).naive_local();
    let start_of_today = local_now.date().and_time(NaiveTime::MIN);

    match range {
        TimeRange::AllTime => true,
        TimeRange::LastHour => local >= local_now - Duration::hours(1) && local < local_now,
        TimeRange::CurrentDay => local >= start_of_today && local < local_now,
        TimeRange::PreviousDay => {
            let start_of_yesterday = start_of_today - Duration::days(1);
            local >= start_of_yesterday && local < start_of_today
        }
        TimeRange::CurrentWeek => {
            let week_start = start_of_week(start_of_today);
            local >= week_start && local < week_start + Duration::days(7)
        }
        TimeRange::PreviousWeek => {
            let week_start = start_of_week(start_of_today) - Duration::days(7);
            local >= week_start && local < week_start + Duration::days(7)
        }
    }
}

/// Sunday 00:00 of the week containing the given day start.
fn start_of_week(start_of_day: NaiveDateTime) -> NaiveDateTime {
    use chrono::Datelike;
    let days_from_sunday = i64::from(start_of_day.date().weekday().num_days_from_sunday());
    start_of_day - Duration::days(days_from_sunday)
}
