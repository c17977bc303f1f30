//! Failure log and learned pattern persistence

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::errors::{EngineError, Result};
use crate::store::schema::SCHEMA;
use crate::types::{FailureEvent, LearnedPattern, PatternSignature, RecordedEvent, RecoveryOutcome};

const EVENT_COLUMNS: &str = "id, timestamp, service, container_id, error_type, error_message, \
     system_state, recovery_attempt, recovery_success, recovery_time";

const PATTERN_COLUMNS: &str = "pattern_hash, error_pattern, success_count, fail_count, last_seen, \
     best_solution, neural_weights, confidence_score";

/// SQLite-backed event store, safe to share between loops behind an `Arc`
pub struct EventStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl EventStore {
    /// Open or create the store file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path_ref)?;

        // WAL for concurrent readers, FULL sync so a returned write survives a crash
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path_ref.to_path_buf()),
        };
        store.migrate()?;

        info!(db_path = %path_ref.display(), "Event store opened");
        Ok(store)
    }

    /// In-memory store (tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Location of the store file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn migrate(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Generic("event store lock poisoned".to_string()))
    }

    /// Append a failure event and return its id
    pub fn record_failure(&self, event: &FailureEvent) -> Result<i64> {
        let conn = self.conn()?;
        let state = serde_json::to_string(&event.system_state)?;

        conn.execute(
            "INSERT INTO failure_events
             (timestamp, service, container_id, error_type, error_message,
              system_state, recovery_attempt, recovery_success, recovery_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.timestamp,
                event.service,
                event.container_id,
                event.error_type,
                event.error_message,
                state,
                event.recovery.as_ref().map(|r| r.attempt.as_str()),
                event.recovery.as_ref().map(|r| r.success),
                event.recovery.as_ref().map(|r| r.duration_secs),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!(event_id = id, service = %event.service, container_id = %event.container_id, "Failure event stored");
        Ok(id)
    }

    /// Fill in the recovery fields of an existing event.
    ///
    /// The outcome is written once; an event that already carries one is
    /// left untouched and reported as `RecoveryAlreadyRecorded`.
    pub fn update_recovery(&self, event_id: i64, attempt: &str, success: bool, duration_secs: f64) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE failure_events
             SET recovery_attempt = ?1, recovery_success = ?2, recovery_time = ?3
             WHERE id = ?4 AND recovery_attempt IS NULL",
            params![attempt, success, duration_secs, event_id],
        )?;

        if changed == 0 {
            let exists = conn
                .query_row("SELECT 1 FROM failure_events WHERE id = ?1", params![event_id], |_| Ok(()))
                .optional()?
                .is_some();
            return Err(if exists {
                EngineError::RecoveryAlreadyRecorded(event_id)
            } else {
                EngineError::EventNotFound(event_id)
            });
        }
        Ok(())
    }

    /// Fetch one event by id
    pub fn get_event(&self, event_id: i64) -> Result<Option<RecordedEvent>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM failure_events WHERE id = ?1", EVENT_COLUMNS);
        let row = conn
            .query_row(&sql, params![event_id], read_event_row)
            .optional()?;
        row.map(finish_event).transpose()
    }

    /// Events with `timestamp > since`, oldest first
    pub fn query_recent(&self, since: f64) -> Result<Vec<RecordedEvent>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM failure_events WHERE timestamp > ?1 ORDER BY timestamp ASC, id ASC",
            EVENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![since], read_event_row)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(finish_event(row?)?);
        }
        Ok(events)
    }

    /// Upsert-with-increment for the event's pattern.
    ///
    /// Unknown outcomes count as failures. A success overwrites the best
    /// solution with the remedy that was just used.
    pub fn upsert_pattern(&self, event: &FailureEvent) -> Result<()> {
        let signature = PatternSignature::from_event(event);
        let payload = serde_json::to_string(&signature)?;
        let success = event.recovery_success() == Some(true);
        let solution = if success { event.recovery_attempt() } else { None };

        self.conn()?.execute(
            "INSERT INTO learned_patterns
             (pattern_hash, error_pattern, success_count, fail_count, last_seen, best_solution)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(pattern_hash) DO UPDATE SET
                success_count = success_count + excluded.success_count,
                fail_count = fail_count + excluded.fail_count,
                last_seen = MAX(last_seen, excluded.last_seen),
                best_solution = COALESCE(excluded.best_solution, best_solution)",
            params![
                signature.key(),
                payload,
                success as i64,
                (!success) as i64,
                event.timestamp,
                solution,
            ],
        )?;
        Ok(())
    }

    /// Every learned pattern
    pub fn all_patterns(&self) -> Result<Vec<LearnedPattern>> {
        let sql = format!("SELECT {} FROM learned_patterns ORDER BY id ASC", PATTERN_COLUMNS);
        self.query_patterns(&sql, params![])
    }

    /// Patterns ranked by total occurrence count
    pub fn top_patterns(&self, limit: usize) -> Result<Vec<LearnedPattern>> {
        let sql = format!(
            "SELECT {} FROM learned_patterns
             ORDER BY (success_count + fail_count) DESC, last_seen DESC
             LIMIT ?1",
            PATTERN_COLUMNS
        );
        self.query_patterns(&sql, params![limit as i64])
    }

    /// Look up a single pattern
    pub fn get_pattern(&self, key: &str) -> Result<Option<LearnedPattern>> {
        let sql = format!("SELECT {} FROM learned_patterns WHERE pattern_hash = ?1", PATTERN_COLUMNS);
        Ok(self.query_patterns(&sql, params![key])?.into_iter().next())
    }

    /// Store the recomputed feature vector and confidence of a pattern
    pub fn update_pattern_scores(&self, key: &str, features: &[f64], confidence: f64) -> Result<()> {
        let weights = serde_json::to_string(features)?;
        self.conn()?.execute(
            "UPDATE learned_patterns SET neural_weights = ?1, confidence_score = ?2 WHERE pattern_hash = ?3",
            params![weights, confidence, key],
        )?;
        Ok(())
    }

    /// Share of events for (service, error type) whose recovery succeeded
    pub fn success_rate(&self, service: &str, error_type: &str) -> Result<f64> {
        let (total, successes): (i64, Option<i64>) = self.conn()?.query_row(
            "SELECT COUNT(*), SUM(CASE WHEN recovery_success = 1 THEN 1 ELSE 0 END)
             FROM failure_events WHERE service = ?1 AND error_type = ?2",
            params![service, error_type],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if total == 0 {
            return Ok(0.0);
        }
        Ok(successes.unwrap_or(0) as f64 / total as f64)
    }

    fn query_patterns(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<LearnedPattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, read_pattern_row)?;

        let mut patterns = Vec::new();
        for row in rows {
            patterns.push(finish_pattern(row?)?);
        }
        Ok(patterns)
    }
}

type EventRow = (
    i64,
    f64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<bool>,
    Option<f64>,
);

fn read_event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn finish_event(row: EventRow) -> Result<RecordedEvent> {
    let (id, timestamp, service, container_id, error_type, error_message, state, attempt, success, time) = row;

    let recovery = match (attempt, success, time) {
        (Some(attempt), Some(success), Some(duration_secs)) => Some(RecoveryOutcome {
            attempt,
            success,
            duration_secs,
        }),
        _ => None,
    };

    Ok(RecordedEvent {
        id,
        event: FailureEvent {
            timestamp,
            service,
            container_id,
            error_type,
            error_message,
            system_state: serde_json::from_str(&state)?,
            recovery,
        },
    })
}

type PatternRow = (String, String, i64, i64, f64, Option<String>, Option<String>, Option<f64>);

fn read_pattern_row(row: &Row<'_>) -> rusqlite::Result<PatternRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn finish_pattern(row: PatternRow) -> Result<LearnedPattern> {
    let (key, payload, success_count, fail_count, last_seen, best_solution, weights, confidence) = row;

    let feature_vector = match weights {
        Some(json) => Some(serde_json::from_str::<Vec<f64>>(&json)?),
        None => None,
    };

    Ok(LearnedPattern {
        pattern_key: key,
        signature: serde_json::from_str(&payload)?,
        success_count: success_count.max(0) as u64,
        fail_count: fail_count.max(0) as u64,
        last_seen,
        best_solution,
        feature_vector,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn event(service: &str, container: &str) -> FailureEvent {
        FailureEvent::new(
            service,
            container,
            "container_inactive",
            "Container status: stopped",
            json!({
                "memory_usage": 2048.0,
                "load_avg": [0.5, 0.4, 0.3],
                "disks": [{"mount": "/", "used_pct": 41.5}]
            }),
        )
    }

    #[test]
    fn test_open_creates_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("failures.db");
        let store = EventStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_record_and_query_round_trip() {
        let store = EventStore::open_in_memory().unwrap();
        let original = event("ollama", "200").with_recovery("restart cmd", true, 2.25);

        let id = store.record_failure(&original).unwrap();
        let events = store.query_recent(original.timestamp - 1.0).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, id);
        assert_eq!(events[0].event, original);
    }

    #[test]
    fn test_query_recent_excludes_older_events() {
        let store = EventStore::open_in_memory().unwrap();
        let mut old = event("ollama", "200");
        old.timestamp -= 7200.0;
        store.record_failure(&old).unwrap();
        let recent = event("qdrant", "201");
        store.record_failure(&recent).unwrap();

        let events = store.query_recent(recent.timestamp - 3600.0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.service, "qdrant");
    }

    #[test]
    fn test_update_recovery() {
        let store = EventStore::open_in_memory().unwrap();
        let id = store.record_failure(&event("mcp", "203")).unwrap();
        assert!(store.get_event(id).unwrap().unwrap().event.recovery.is_none());

        store.update_recovery(id, "pvesh create start", false, 0.8).unwrap();

        let stored = store.get_event(id).unwrap().unwrap();
        assert_eq!(stored.event.recovery_success(), Some(false));
        assert_eq!(stored.event.recovery_attempt(), Some("pvesh create start"));
    }

    #[test]
    fn test_update_recovery_missing_event() {
        let store = EventStore::open_in_memory().unwrap();
        let err = store.update_recovery(99, "start", true, 1.0).unwrap_err();
        assert!(matches!(err, EngineError::EventNotFound(99)));
    }

    #[test]
    fn test_update_recovery_written_once() {
        let store = EventStore::open_in_memory().unwrap();
        let id = store.record_failure(&event("mcp", "203")).unwrap();
        store.update_recovery(id, "pvesh create start", true, 0.8).unwrap();

        let err = store.update_recovery(id, "pvesh create restart", false, 2.0).unwrap_err();
        assert!(matches!(err, EngineError::RecoveryAlreadyRecorded(i) if i == id));

        let stored = store.get_event(id).unwrap().unwrap();
        assert_eq!(stored.event.recovery_success(), Some(true));
        assert_eq!(stored.event.recovery_attempt(), Some("pvesh create start"));
    }

    #[test]
    fn test_upsert_pattern_increments() {
        let store = EventStore::open_in_memory().unwrap();
        let base = event("ollama", "200");

        store.upsert_pattern(&base.clone().with_recovery("start cmd", true, 1.0)).unwrap();
        store.upsert_pattern(&base.clone().with_recovery("restart cmd", false, 1.0)).unwrap();
        store.upsert_pattern(&base).unwrap();

        let pattern = store.get_pattern(&base.pattern_key()).unwrap().unwrap();
        assert_eq!(pattern.success_count, 1);
        assert_eq!(pattern.fail_count, 2);
        assert_eq!(pattern.best_solution.as_deref(), Some("start cmd"));
        assert_eq!(pattern.signature.service, "ollama");
    }

    #[test]
    fn test_best_solution_most_recent_success_wins() {
        let store = EventStore::open_in_memory().unwrap();
        let base = event("ollama", "200");

        store.upsert_pattern(&base.clone().with_recovery("start cmd", true, 1.0)).unwrap();
        store.upsert_pattern(&base.clone().with_recovery("restart cmd", true, 1.0)).unwrap();

        let pattern = store.get_pattern(&base.pattern_key()).unwrap().unwrap();
        assert_eq!(pattern.best_solution.as_deref(), Some("restart cmd"));
    }

    #[test]
    fn test_top_patterns_ranked_by_total() {
        let store = EventStore::open_in_memory().unwrap();
        for _ in 0..3 {
            store.upsert_pattern(&event("ollama", "200")).unwrap();
        }
        store.upsert_pattern(&event("qdrant", "201")).unwrap();
        for _ in 0..2 {
            store.upsert_pattern(&event("mcp", "203")).unwrap();
        }

        let top = store.top_patterns(2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].signature.service, "ollama");
        assert_eq!(top[1].signature.service, "mcp");
    }

    #[test]
    fn test_update_pattern_scores() {
        let store = EventStore::open_in_memory().unwrap();
        let base = event("ollama", "200");
        store.upsert_pattern(&base).unwrap();

        store.update_pattern_scores(&base.pattern_key(), &[1.0, 0.5], 0.9).unwrap();

        let pattern = store.get_pattern(&base.pattern_key()).unwrap().unwrap();
        assert_eq!(pattern.feature_vector, Some(vec![1.0, 0.5]));
        assert_eq!(pattern.confidence, Some(0.9));
    }

    #[test]
    fn test_success_rate() {
        let store = EventStore::open_in_memory().unwrap();
        assert_eq!(store.success_rate("ollama", "container_inactive").unwrap(), 0.0);

        store.record_failure(&event("ollama", "200").with_recovery("restart", true, 1.0)).unwrap();
        store.record_failure(&event("ollama", "200").with_recovery("restart", false, 1.0)).unwrap();
        store.record_failure(&event("ollama", "200").with_recovery("restart", true, 1.0)).unwrap();
        store.record_failure(&event("ollama", "200")).unwrap();

        let rate = store.success_rate("ollama", "container_inactive").unwrap();
        assert!((rate - 0.5).abs() < 1e-9);
    }
}
