//! Table layout of the store file

/// Schema applied on open; idempotent
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS failure_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp REAL NOT NULL,
    service TEXT NOT NULL,
    container_id TEXT NOT NULL,
    error_type TEXT NOT NULL,
    error_message TEXT NOT NULL,
    system_state TEXT NOT NULL,
    recovery_attempt TEXT,
    recovery_success INTEGER,
    recovery_time REAL
);

CREATE INDEX IF NOT EXISTS idx_failure_events_time
    ON failure_events(timestamp);

CREATE INDEX IF NOT EXISTS idx_failure_events_service
    ON failure_events(service, error_type);

CREATE TABLE IF NOT EXISTS learned_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_hash TEXT NOT NULL UNIQUE,
    error_pattern TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    fail_count INTEGER NOT NULL DEFAULT 0,
    last_seen REAL NOT NULL,
    best_solution TEXT,
    neural_weights TEXT,
    confidence_score REAL
);

CREATE TABLE IF NOT EXISTS failure_predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp REAL NOT NULL,
    service TEXT NOT NULL,
    container_id TEXT NOT NULL,
    predicted_error_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    predicted_time REAL NOT NULL,
    was_correct INTEGER
);

CREATE TABLE IF NOT EXISTS pattern_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_type TEXT NOT NULL,
    pattern_state TEXT NOT NULL,
    neural_metrics TEXT NOT NULL,
    flow_state TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pattern_predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_type TEXT NOT NULL,
    evolution_confidence REAL NOT NULL,
    evolution_time TEXT NOT NULL,
    emergence_type TEXT NOT NULL,
    pattern_signature TEXT NOT NULL,
    neural_state TEXT NOT NULL,
    flow_metrics TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Tables the store is expected to hold
pub const TABLES: [&str; 5] = [
    "failure_events",
    "learned_patterns",
    "failure_predictions",
    "pattern_history",
    "pattern_predictions",
];
