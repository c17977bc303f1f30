//! Type definitions module
//!
//! Core records shared by the store, the learner and the predictors.

pub mod events;

// Re-export commonly used types
pub use events::{now_secs, pattern_key, FailureEvent, LearnedPattern, PatternSignature, RecordedEvent, RecoveryOutcome};

// Prediction records
pub mod predictions;
pub use predictions::{EmergenceType, FailurePrediction, PatternEvolutionPrediction};
