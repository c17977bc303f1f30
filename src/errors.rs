//! Error types for failsight
//!
//! One error enum for the engine, with conversions from the storage,
//! serialization and transport layers.

use thiserror::Error;

/// Main error type for the failure learning engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Durable store errors (unreachable, corrupt, constraint failures)
    #[error("Store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    /// Event not present in the store
    #[error("Failure event {0} not found")]
    EventNotFound(i64),

    /// Event already carries a recovery outcome
    #[error("Recovery outcome for event {0} already recorded")]
    RecoveryAlreadyRecorded(i64),

    /// Malformed system-state snapshot
    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    /// Outlier model was asked to score before any training happened
    #[error("Anomaly model has not been trained yet")]
    ModelNotTrained,

    /// Scoring row does not match the trained model
    #[error("Feature width mismatch: model expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Probe or control-plane failures
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Ingestion queue closed or full
    #[error("Event queue unavailable: {0}")]
    QueueError(String),

    /// Generic errors with context
    #[error("Engine error: {0}")]
    Generic(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Convert anyhow errors to EngineError
impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Generic(err.to_string())
    }
}
