//! Prediction records emitted by the anomaly and trend predictors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error category used for anomaly forecasts
pub const PREDICTED_FAILURE: &str = "predicted_failure";

/// One anomaly forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePrediction {
    /// Store-assigned id, `None` before insertion
    pub id: Option<i64>,

    /// Emission time, seconds since epoch
    pub timestamp: f64,

    pub service: String,

    pub container_id: String,

    /// Predicted error category
    pub predicted_error_type: String,

    /// Confidence in 0-1
    pub confidence: f64,

    /// Predicted occurrence time, seconds since epoch
    pub predicted_time: f64,

    /// Backfilled once the predicted window elapsed
    pub was_correct: Option<bool>,
}

/// How a pattern is currently evolving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergenceType {
    Degradation,
    ResourceOptimization,
    FlowEnhancement,
    PatternEvolution,
    StableOperation,
}

impl EmergenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergenceType::Degradation => "degradation",
            EmergenceType::ResourceOptimization => "resource_optimization",
            EmergenceType::FlowEnhancement => "flow_enhancement",
            EmergenceType::PatternEvolution => "pattern_evolution",
            EmergenceType::StableOperation => "stable_operation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "degradation" => Some(EmergenceType::Degradation),
            "resource_optimization" => Some(EmergenceType::ResourceOptimization),
            "flow_enhancement" => Some(EmergenceType::FlowEnhancement),
            "pattern_evolution" => Some(EmergenceType::PatternEvolution),
            "stable_operation" => Some(EmergenceType::StableOperation),
            _ => None,
        }
    }
}

impl std::fmt::Display for EmergenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trend forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEvolutionPrediction {
    pub pattern_type: String,

    /// Confidence in 0-1
    pub evolution_confidence: f64,

    /// When the pattern is expected to evolve
    pub evolution_time: DateTime<Utc>,

    pub emergence_type: EmergenceType,

    /// Serialized detected sub-patterns
    pub pattern_signature: String,

    /// Serialized state analysis
    pub neural_state: String,

    /// Serialized stability and flow health
    pub flow_metrics: String,
}
