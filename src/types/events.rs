//! Failure events and learned pattern records

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the epoch with sub-second precision
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Composite identity of a failure signature.
///
/// Two failures belong to the same pattern iff all three fields match exactly.
pub fn pattern_key(service: &str, error_type: &str, container_id: &str) -> String {
    format!("{}:{}:{}", service, error_type, container_id)
}

/// Outcome of one recovery attempt.
///
/// Kept as a single optional value on the event so the three recovery
/// columns are either all null or all populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Command or remedy description that was executed
    pub attempt: String,

    /// Whether the remedy brought the service back
    pub success: bool,

    /// Wall-clock duration of the attempt in seconds
    pub duration_secs: f64,
}

/// One observed failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Seconds since epoch
    pub timestamp: f64,

    /// Monitored service name
    pub service: String,

    /// Container or unit identifier
    pub container_id: String,

    /// Free-form failure category
    pub error_type: String,

    /// Human-readable failure description
    pub error_message: String,

    /// Opaque system-state snapshot captured at failure time
    pub system_state: serde_json::Value,

    /// Recovery outcome, `None` until a remedy was tried
    pub recovery: Option<RecoveryOutcome>,
}

impl FailureEvent {
    /// Create an event stamped with the current time and no recovery yet
    pub fn new(
        service: impl Into<String>,
        container_id: impl Into<String>,
        error_type: impl Into<String>,
        error_message: impl Into<String>,
        system_state: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: now_secs(),
            service: service.into(),
            container_id: container_id.into(),
            error_type: error_type.into(),
            error_message: error_message.into(),
            system_state,
            recovery: None,
        }
    }

    /// Attach a recovery outcome
    pub fn with_recovery(mut self, attempt: impl Into<String>, success: bool, duration_secs: f64) -> Self {
        self.recovery = Some(RecoveryOutcome {
            attempt: attempt.into(),
            success,
            duration_secs,
        });
        self
    }

    /// Pattern key of this event
    pub fn pattern_key(&self) -> String {
        pattern_key(&self.service, &self.error_type, &self.container_id)
    }

    /// Tri-state recovery flag: unknown / true / false
    pub fn recovery_success(&self) -> Option<bool> {
        self.recovery.as_ref().map(|r| r.success)
    }

    /// Recovery attempt description, if any
    pub fn recovery_attempt(&self) -> Option<&str> {
        self.recovery.as_ref().map(|r| r.attempt.as_str())
    }
}

/// A failure event together with its store-assigned id
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub id: i64,
    pub event: FailureEvent,
}

/// Serialized signature payload of a learned pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSignature {
    pub service: String,
    pub error_type: String,
    pub container_id: String,
}

impl PatternSignature {
    pub fn from_event(event: &FailureEvent) -> Self {
        Self {
            service: event.service.clone(),
            error_type: event.error_type.clone(),
            container_id: event.container_id.clone(),
        }
    }

    pub fn key(&self) -> String {
        pattern_key(&self.service, &self.error_type, &self.container_id)
    }
}

/// Aggregated statistics for one failure signature
#[derive(Debug, Clone, PartialEq)]
pub struct LearnedPattern {
    /// Unique composite key
    pub pattern_key: String,

    /// Signature the key was built from
    pub signature: PatternSignature,

    /// Recoveries that worked
    pub success_count: u64,

    /// Recoveries that failed or were never attempted
    pub fail_count: u64,

    /// Timestamp of the latest occurrence
    pub last_seen: f64,

    /// Most recently successful remedy
    pub best_solution: Option<String>,

    /// Feature vector from the last analysis pass
    pub feature_vector: Option<Vec<f64>>,

    /// Confidence from the last analysis pass
    pub confidence: Option<f64>,
}

impl LearnedPattern {
    /// Total number of occurrences
    pub fn total(&self) -> u64 {
        self.success_count + self.fail_count
    }

    /// success / (success + fail), `None` when the pattern was never seen
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            None
        } else {
            Some(self.success_count as f64 / total as f64)
        }
    }
}
