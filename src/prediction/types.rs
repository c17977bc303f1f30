//! Trend sample and analysis types

use serde::{Deserialize, Serialize};

/// Health status that counts as fully healthy
pub const OPTIMAL: &str = "optimal";

/// Component health as reported by the pattern source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthState {
    pub status: String,
}

/// Connectivity between components
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowState {
    pub connected: bool,
    /// Milliseconds
    pub latency: f64,
}

/// Resource consumption figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceState {
    /// Percentage-like utilisation figure
    pub efficiency: f64,
}

/// One observation of a pattern type.
///
/// Missing sections deserialize to their defaults, so an absent flow state
/// reads as disconnected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSample {
    pub pattern_type: String,
    pub neural_health: HealthState,
    pub flow_state: FlowState,
    pub neural_resources: ResourceState,
}

impl TrendSample {
    pub fn is_optimal(&self) -> bool {
        self.neural_health.status == OPTIMAL
    }
}

/// Derived health metrics of a single sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateAnalysis {
    pub stability: f64,
    pub resource_pressure: f64,
    pub flow_health: f64,
    pub overall_health: f64,
}

/// Which series a detected trend was computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    ResourceEvolution,
    HealthEvolution,
    FlowEvolution,
}

/// A trend over the last window of samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    #[serde(rename = "type")]
    pub kind: PatternKind,
    /// Absolute OLS slope
    pub confidence: f64,
    /// increasing/decreasing, improving/degrading, strengthening/weakening
    pub direction: String,
}
