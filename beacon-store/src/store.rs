//! SQLite-backed reconciling store.
//!
//! # Durability
//!
//! The database is opened with:
//! - `journal_mode = WAL` for crash safety and concurrent readers
//! - `synchronous = FULL` so an acknowledged merge survives power loss
//! - `busy_timeout = 5000ms` for graceful concurrent access
//!
//! # Concurrency
//!
//! Merges are serialized per composite key through a lock map; merges on
//! different keys only contend on the short SQLite write itself. The
//! read-compare-write inside a merge runs in a single transaction on a
//! blocking thread, so no reader ever observes a record mid-merge.
//!
//! # Change notifications
//!
//! A store built with [`WorkflowStore::with_event_sink`] emits newsworthy
//! merge outcomes into a bounded channel. The emission happens while the
//! per-key lock is still held, so the channel carries outcomes for any one
//! key in version order even when deliveries race.
//!
//! # Schema versioning
//!
//! A `schema_version` table tracks the schema. When the schema changes,
//! increment `CURRENT_SCHEMA_VERSION` and add a migration in
//! `run_migrations()`; migrations run sequentially on open.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use beacon_core::record::{Conclusion, MergeKind, MergeOutcome, WorkflowDelta, WorkflowKey, WorkflowRecord};
use beacon_core::filter::FilterSpec;

/// Current schema version. Increment when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file. `:memory:` for tests.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl StoreConfig {
    /// Applies environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("BEACON_STORAGE_PATH") {
            self.path = PathBuf::from(path);
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./beacon.db")
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite error.
    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error while preparing the database location.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// The store could not be brought into a usable state.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Snapshot query parameters for [`WorkflowStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Time-range/status filter, shared with the broadcast path.
    pub filter: FilterSpec,
    /// Optional repository substring filter.
    pub repository: Option<String>,
    /// Maximum number of records to return.
    pub limit: usize,
    /// Caller's UTC offset in minutes (browser convention).
    pub utc_offset: i32,
}

/// SQLite-backed workflow store with per-key merge serialization.
///
/// Synchronous rusqlite operations run under `tokio::task::spawn_blocking`
/// so they never block the async runtime.
pub struct WorkflowStore {
    conn: Arc<Mutex<Connection>>,
    key_locks: DashMap<WorkflowKey, Arc<tokio::sync::Mutex<()>>>,
    events: Option<mpsc::Sender<MergeOutcome>>,
}

impl WorkflowStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// Creates the parent directory and schema as needed and runs pending
    /// migrations.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let path: &Path = &config.path;
        let path_str = path.to_string_lossy();
        let is_in_memory = path_str == ":memory:";

        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let conn = Connection::open(path)?;

        // WAL can silently stay off on filesystems without shared-memory
        // support; that would break the durability contract, so verify.
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(StoreError::Unavailable(format!(
                "failed to enable WAL mode, SQLite reports journal_mode={journal_mode}"
            )));
        }

        conn.execute_batch(
            r"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            ",
        )?;

        let current_version: i64 = conn
            .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        info!(path = %path.display(), "Workflow store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key_locks: DashMap::new(),
            events: None,
        })
    }

    /// Attaches a change-notification sink.
    ///
    /// Merge outcomes for which [`MergeOutcome::should_broadcast`] holds
    /// are sent into the channel before the per-key lock is released, so
    /// receivers observe non-decreasing versions per key. Sending never
    /// blocks: when the channel is full the notification is dropped with a
    /// warning and subscribers recover through their next snapshot query.
    #[must_use]
    pub fn with_event_sink(mut self, events: mpsc::Sender<MergeOutcome>) -> Self {
        self.events = Some(events);
        self
    }

    /// Runs migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), StoreError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::Unavailable(format!(
                "database schema version {from_version} is newer than supported version {CURRENT_SCHEMA_VERSION}"
            )));
        }
        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            // run_id is part of the uniqueness boundary but may be NULL for
            // job-only events; the expression index folds NULL into a
            // sentinel so the composite key stays unique.
            conn.execute_batch(
                r"
                CREATE TABLE IF NOT EXISTS workflow_runs (
                    repository TEXT NOT NULL,
                    workflow_id INTEGER NOT NULL,
                    run_id INTEGER,
                    workflow_name TEXT NOT NULL,
                    conclusion TEXT,
                    run_number INTEGER,
                    run_url TEXT,
                    head_branch TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    version INTEGER NOT NULL DEFAULT 1
                );

                CREATE UNIQUE INDEX IF NOT EXISTS ux_workflow_key
                    ON workflow_runs(repository, workflow_id, IFNULL(run_id, -1));
                CREATE INDEX IF NOT EXISTS idx_repository_workflow
                    ON workflow_runs(repository, workflow_id);
                CREATE INDEX IF NOT EXISTS idx_updated_at
                    ON workflow_runs(updated_at);
                ",
            )?;
        }

        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = ?1",
            params![CURRENT_SCHEMA_VERSION],
        )?;

        debug!(from_version, to_version = CURRENT_SCHEMA_VERSION, "Migrations applied");
        Ok(())
    }

    /// Merges a delta into the store.
    ///
    /// Merges for the same composite key are serialized; the returned
    /// outcome reflects durable state (the transaction has committed before
    /// this returns). Stale deltas leave the store untouched. Newsworthy
    /// outcomes are emitted to the event sink, if one is attached, while
    /// the key lock is still held.
    pub async fn merge(&self, delta: WorkflowDelta) -> Result<MergeOutcome, StoreError> {
        let key = delta.key.clone();
        let lock = self
            .key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let guard = lock.lock().await;

        let conn = self.conn.clone();
        let observed_at = Utc::now();
        let result = run_blocking(move || {
            let mut conn = conn.lock();
            merge_sync(&mut conn, &delta, observed_at)
        })
        .await;

        if let (Ok(outcome), Some(events)) = (&result, &self.events) {
            if outcome.should_broadcast() && events.try_send(outcome.clone()).is_err() {
                warn!(key = %outcome.record.key, "Event sink full, dropping notification");
            }
        }

        drop(guard);
        drop(lock);
        // A lock only referenced by the map has no waiters; evicting it
        // keeps the map bounded by in-flight merges, not by key history.
        self.key_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    /// Lists records matching the query, ordered by `updated_at` descending.
    ///
    /// The snapshot reflects store state at call time; the filter engine is
    /// the same one the broadcast path uses.
    pub async fn list(&self, query: ListQuery) -> Result<Vec<WorkflowRecord>, StoreError> {
        let conn = self.conn.clone();
        let now = Utc::now();
        run_blocking(move || {
            let conn = conn.lock();
            list_sync(&conn, &query, now)
        })
        .await
    }

    /// Fetches a single record by key, if present.
    pub async fn get(&self, key: WorkflowKey) -> Result<Option<WorkflowRecord>, StoreError> {
        let conn = self.conn.clone();
        run_blocking(move || {
            let conn = conn.lock();
            lookup(&conn, &key)
        })
        .await
    }

    /// Probes storage connectivity for the health endpoint.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        run_blocking(move || {
            let conn = conn.lock();
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}

/// Runs a blocking store operation on the blocking thread pool.
async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("storage task failed: {e}")))?
}

fn merge_sync(
    conn: &mut Connection,
    delta: &WorkflowDelta,
    observed_at: DateTime<Utc>,
) -> Result<MergeOutcome, StoreError> {
    let tx = conn.transaction()?;

    let existing = lookup(&tx, &delta.key)?;

    let outcome = match existing {
        None => {
            let record = WorkflowRecord {
                key: delta.key.clone(),
                workflow_name: delta.workflow_name.clone(),
                conclusion: delta.conclusion,
                run_number: delta.run_number,
                run_url: delta.run_url.clone(),
                head_branch: delta.head_branch.clone(),
                created_at: observed_at,
                updated_at: delta.updated_at,
                version: 1,
            };
            tx.execute(
                "INSERT INTO workflow_runs
                    (repository, workflow_id, run_id, workflow_name, conclusion,
                     run_number, run_url, head_branch, created_at, updated_at, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.key.repository,
                    record.key.workflow_id,
                    record.key.run_id,
                    record.workflow_name,
                    record.conclusion.map(|c| c.to_string()),
                    record.run_number,
                    record.run_url,
                    record.head_branch,
                    encode_ts(record.created_at),
                    encode_ts(record.updated_at),
                    i64::try_from(record.version).unwrap_or(i64::MAX),
                ],
            )?;
            debug!(key = %record.key, "Workflow record created");
            MergeOutcome {
                kind: MergeKind::Created,
                status_changed: false,
                record,
            }
        }
        Some(stored) if delta.supersedes(&stored) => {
            let status_changed = stored.conclusion != delta.conclusion;
            let record = WorkflowRecord {
                key: stored.key.clone(),
                workflow_name: delta.workflow_name.clone(),
                conclusion: delta.conclusion,
                run_number: delta.run_number,
                run_url: delta.run_url.clone().or(stored.run_url),
                head_branch: delta.head_branch.clone().or(stored.head_branch),
                created_at: stored.created_at,
                updated_at: delta.updated_at,
                version: stored.version + 1,
            };
            tx.execute(
                "UPDATE workflow_runs
                 SET workflow_name = ?4, conclusion = ?5, run_number = ?6,
                     run_url = ?7, head_branch = ?8, updated_at = ?9, version = ?10
                 WHERE repository = ?1 AND workflow_id = ?2
                   AND IFNULL(run_id, -1) = IFNULL(?3, -1)",
                params![
                    record.key.repository,
                    record.key.workflow_id,
                    record.key.run_id,
                    record.workflow_name,
                    record.conclusion.map(|c| c.to_string()),
                    record.run_number,
                    record.run_url,
                    record.head_branch,
                    encode_ts(record.updated_at),
                    i64::try_from(record.version).unwrap_or(i64::MAX),
                ],
            )?;
            debug!(key = %record.key, version = record.version, status_changed, "Workflow record updated");
            MergeOutcome {
                kind: MergeKind::Updated,
                status_changed,
                record,
            }
        }
        Some(stored) => {
            debug!(key = %stored.key, "Stale delta rejected");
            MergeOutcome {
                kind: MergeKind::Stale,
                status_changed: false,
                record: stored,
            }
        }
    };

    tx.commit()?;
    Ok(outcome)
}

const SELECT_COLUMNS: &str = "repository, workflow_id, run_id, workflow_name, conclusion, \
     run_number, run_url, head_branch, created_at, updated_at, version";

fn lookup(conn: &Connection, key: &WorkflowKey) -> Result<Option<WorkflowRecord>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {SELECT_COLUMNS} FROM workflow_runs
         WHERE repository = ?1 AND workflow_id = ?2
           AND IFNULL(run_id, -1) = IFNULL(?3, -1)"
    ))?;
    stmt.query_row(params![key.repository, key.workflow_id, key.run_id], row_to_record)
        .optional()?
        .transpose()
}

fn list_sync(
    conn: &Connection,
    query: &ListQuery,
    now: DateTime<Utc>,
) -> Result<Vec<WorkflowRecord>, StoreError> {
    let mut records = Vec::new();

    let mut collect = |rows: &mut rusqlite::Rows<'_>| -> Result<(), StoreError> {
        while let Some(row) = rows.next()? {
            if records.len() >= query.limit {
                break;
            }
            let record = row_to_record(row)??;
            if query.filter.matches(&record, now, query.utc_offset) {
                records.push(record);
            }
        }
        Ok(())
    };

    if let Some(repository) = &query.repository {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM workflow_runs
             WHERE repository LIKE ?1 ORDER BY updated_at DESC"
        ))?;
        let pattern = format!("%{repository}%");
        let mut rows = stmt.query(params![pattern])?;
        collect(&mut rows)?;
    } else {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM workflow_runs ORDER BY updated_at DESC"
        ))?;
        let mut rows = stmt.query([])?;
        collect(&mut rows)?;
    }

    Ok(records)
}

type RecordResult = Result<WorkflowRecord, StoreError>;

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<RecordResult, rusqlite::Error> {
    let conclusion_raw: Option<String> = row.get(4)?;
    let created_at_raw: String = row.get(8)?;
    let updated_at_raw: String = row.get(9)?;
    let version_raw: i64 = row.get(10)?;

    let build = || -> RecordResult {
        let conclusion = match conclusion_raw.as_deref() {
            None => None,
            Some(raw) => Some(
                Conclusion::parse(raw)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown conclusion {raw:?}")))?,
            ),
        };
        Ok(WorkflowRecord {
            key: WorkflowKey {
                repository: row.get(0)?,
                workflow_id: row.get(1)?,
                run_id: row.get(2)?,
            },
            workflow_name: row.get(3)?,
            conclusion,
            run_number: row.get(5)?,
            run_url: row.get(6)?,
            head_branch: row.get(7)?,
            created_at: decode_ts(&created_at_raw)?,
            updated_at: decode_ts(&updated_at_raw)?,
            version: u64::try_from(version_raw)
                .map_err(|_| StoreError::Corrupt(format!("negative version {version_raw}")))?,
        })
    };

    Ok(build())
}

/// Fixed-width RFC 3339 in UTC so lexicographic ordering in SQL equals
/// chronological ordering.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::filter::{StatusFilter, TimeRange};
    use chrono::TimeZone;
    use std::sync::Arc as StdArc;

    fn memory_store() -> WorkflowStore {
        let config = StoreConfig {
            path: PathBuf::from(":memory:"),
        };
        WorkflowStore::open(&config).expect("open in-memory store")
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn delta(
        run_number: Option<i64>,
        conclusion: Option<Conclusion>,
        updated_secs: i64,
    ) -> WorkflowDelta {
        WorkflowDelta {
            key: WorkflowKey {
                repository: "org/repo".to_string(),
                workflow_id: 42,
                run_id: Some(789_012),
            },
            workflow_name: "CI".to_string(),
            conclusion,
            run_number,
            run_url: Some("https://github.com/org/repo/actions/runs/789012".to_string()),
            head_branch: Some("main".to_string()),
            updated_at: ts(updated_secs),
        }
    }

    fn all_query() -> ListQuery {
        ListQuery {
            filter: FilterSpec::default(),
            repository: None,
            limit: 50,
            utc_offset: 0,
        }
    }

    #[tokio::test]
    async fn test_first_merge_creates_version_one() {
        let store = memory_store();
        let outcome = store
            .merge(delta(Some(5), Some(Conclusion::Pending), 100))
            .await
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Created);
        assert_eq!(outcome.record.version, 1);
        assert!(outcome.should_broadcast());
    }

    #[tokio::test]
    async fn test_identical_redelivery_is_stale() {
        let store = memory_store();
        let d = delta(Some(5), Some(Conclusion::Success), 100);

        store.merge(d.clone()).await.unwrap();
        let outcome = store.merge(d).await.unwrap();

        assert_eq!(outcome.kind, MergeKind::Stale);
        assert_eq!(outcome.record.version, 1);
        assert!(!outcome.should_broadcast());
    }

    #[tokio::test]
    async fn test_fresher_delta_updates_and_flags_status_change() {
        let store = memory_store();
        store
            .merge(delta(Some(5), Some(Conclusion::Pending), 100))
            .await
            .unwrap();

        let outcome = store
            .merge(delta(Some(5), Some(Conclusion::Success), 200))
            .await
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Updated);
        assert!(outcome.status_changed);
        assert_eq!(outcome.record.version, 2);
        assert_eq!(outcome.record.conclusion, Some(Conclusion::Success));
        assert!(outcome.should_broadcast());
    }

    #[tokio::test]
    async fn test_cosmetic_refresh_is_not_broadcast() {
        let store = memory_store();
        store
            .merge(delta(Some(5), Some(Conclusion::Pending), 100))
            .await
            .unwrap();

        let outcome = store
            .merge(delta(Some(5), Some(Conclusion::Pending), 200))
            .await
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Updated);
        assert!(!outcome.status_changed);
        assert!(!outcome.should_broadcast());
    }

    #[tokio::test]
    async fn test_out_of_order_delivery_converges() {
        // Applying fresher-then-older yields the same stored record as
        // older-then-fresher.
        let older = delta(Some(5), Some(Conclusion::Pending), 100);
        let fresher = delta(Some(6), Some(Conclusion::Success), 200);

        let store_a = memory_store();
        store_a.merge(older.clone()).await.unwrap();
        store_a.merge(fresher.clone()).await.unwrap();
        let a = store_a.get(older.key.clone()).await.unwrap().unwrap();

        let store_b = memory_store();
        store_b.merge(fresher.clone()).await.unwrap();
        let outcome = store_b.merge(older.clone()).await.unwrap();
        let b = store_b.get(older.key.clone()).await.unwrap().unwrap();

        assert_eq!(outcome.kind, MergeKind::Stale);
        assert_eq!(a.conclusion, b.conclusion);
        assert_eq!(a.run_number, b.run_number);
        assert_eq!(a.updated_at, b.updated_at);
    }

    #[tokio::test]
    async fn test_stale_delta_never_mutates() {
        let store = memory_store();
        store
            .merge(delta(Some(6), Some(Conclusion::Success), 200))
            .await
            .unwrap();

        let outcome = store
            .merge(delta(Some(5), Some(Conclusion::Failure), 100))
            .await
            .unwrap();

        assert_eq!(outcome.kind, MergeKind::Stale);
        assert_eq!(outcome.record.conclusion, Some(Conclusion::Success));
        assert_eq!(outcome.record.version, 1);
    }

    #[tokio::test]
    async fn test_job_provisional_record_loses_to_run_event() {
        let store = memory_store();
        let mut job = delta(None, Some(Conclusion::Pending), 300);
        job.key.run_id = None;
        store.merge(job.clone()).await.unwrap();

        let mut run = delta(Some(1), Some(Conclusion::Success), 100);
        run.key.run_id = None;
        let outcome = store.merge(run).await.unwrap();

        assert_eq!(outcome.kind, MergeKind::Updated);
        assert_eq!(outcome.record.run_number, Some(1));
    }

    #[tokio::test]
    async fn test_event_sink_receives_newsworthy_outcomes_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let store = memory_store().with_event_sink(tx);

        store
            .merge(delta(Some(5), Some(Conclusion::Pending), 100))
            .await
            .unwrap();
        store
            .merge(delta(Some(5), Some(Conclusion::Success), 200))
            .await
            .unwrap();
        // Stale redelivery must not reach the sink.
        store
            .merge(delta(Some(5), Some(Conclusion::Success), 200))
            .await
            .unwrap();

        assert_eq!(rx.try_recv().unwrap().record.version, 1);
        assert_eq!(rx.try_recv().unwrap().record.version, 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_racing_merges_emit_monotonic_versions() {
        // Deliveries for the same key racing through separate tasks must
        // never put an older version behind a newer one in the sink.
        let (tx, mut rx) = mpsc::channel(32);
        let store = StdArc::new(memory_store().with_event_sink(tx));

        let conclusions = [
            Conclusion::Pending,
            Conclusion::Success,
            Conclusion::Failure,
            Conclusion::Cancelled,
        ];
        let mut tasks = Vec::new();
        for (i, conclusion) in conclusions.into_iter().enumerate() {
            let store = store.clone();
            let d = delta(Some(5), Some(conclusion), 100 + i64::try_from(i).unwrap());
            tasks.push(tokio::spawn(async move { store.merge(d).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut versions = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            versions.push(outcome.record.version);
        }
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]), "{versions:?}");
    }

    #[tokio::test]
    async fn test_key_lock_map_drains_after_merge() {
        let store = memory_store();

        store
            .merge(delta(Some(5), Some(Conclusion::Pending), 100))
            .await
            .unwrap();
        store
            .merge(delta(Some(5), Some(Conclusion::Success), 200))
            .await
            .unwrap();

        assert!(store.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_merges_same_key_produce_one_update() {
        let store = StdArc::new(memory_store());
        store
            .merge(delta(Some(5), Some(Conclusion::Pending), 100))
            .await
            .unwrap();

        let d1 = delta(Some(5), Some(Conclusion::Success), 200);
        let d2 = delta(Some(5), Some(Conclusion::Success), 200);

        let (a, b) = tokio::join!(
            { let store = store.clone(); async move { store.merge(d1).await } },
            { let store = store.clone(); async move { store.merge(d2).await } },
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let updated = [&a, &b]
            .iter()
            .filter(|o| o.kind == MergeKind::Updated)
            .count();
        let stale = [&a, &b]
            .iter()
            .filter(|o| o.kind == MergeKind::Stale)
            .count();
        assert_eq!(updated, 1);
        assert_eq!(stale, 1);

        let stored = store.get(a.record.key.clone()).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_list_orders_by_updated_at_descending() {
        let store = memory_store();
        let mut early = delta(Some(1), Some(Conclusion::Success), 100);
        early.key.run_id = Some(1);
        let mut late = delta(Some(1), Some(Conclusion::Failure), 200);
        late.key.run_id = Some(2);
        store.merge(early).await.unwrap();
        store.merge(late).await.unwrap();

        let records = store.list(all_query()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key.run_id, Some(2));
        assert_eq!(records[1].key.run_id, Some(1));
    }

    #[tokio::test]
    async fn test_list_applies_status_filter_and_limit() {
        let store = memory_store();
        for (i, conclusion) in [
            Conclusion::Success,
            Conclusion::Failure,
            Conclusion::Success,
        ]
        .iter()
        .enumerate()
        {
            let mut d = delta(Some(1), Some(*conclusion), 100 + i64::try_from(i).unwrap());
            d.key.run_id = Some(i64::try_from(i).unwrap());
            store.merge(d).await.unwrap();
        }

        let mut query = all_query();
        query.filter = FilterSpec {
            time_range: TimeRange::AllTime,
            status: StatusFilter::Success,
        };
        let records = store.list(query.clone()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.conclusion == Some(Conclusion::Success)));

        query.limit = 1;
        let records = store.list(query).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_list_repository_substring_filter() {
        let store = memory_store();
        let mut a = delta(Some(1), Some(Conclusion::Success), 100);
        a.key.repository = "org/frontend".to_string();
        let mut b = delta(Some(1), Some(Conclusion::Success), 200);
        b.key.repository = "org/backend".to_string();
        store.merge(a).await.unwrap();
        store.merge(b).await.unwrap();

        let mut query = all_query();
        query.repository = Some("front".to_string());
        let records = store.list(query).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.repository, "org/frontend");
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = memory_store();
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_null_run_id_keys_stay_unique() {
        let store = memory_store();
        let mut d = delta(None, Some(Conclusion::Pending), 100);
        d.key.run_id = None;
        store.merge(d.clone()).await.unwrap();

        d.updated_at = ts(200);
        let outcome = store.merge(d).await.unwrap();
        assert_eq!(outcome.kind, MergeKind::Updated);

        let records = store.list(all_query()).await.unwrap();
        assert_eq!(records.len(), 1);
    }
}
