//! Trend evolution predictor
//!
//! Keeps a bounded FIFO window of samples per pattern type, derives health
//! metrics from the newest sample and fits least-squares slopes over the
//! window to classify where each pattern is heading.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::engine::shutdown::ShutdownSignal;
use crate::errors::{EngineError, Result};
use crate::prediction::source::TrendSource;
use crate::prediction::types::{DetectedPattern, PatternKind, StateAnalysis, TrendSample};
use crate::store::EventStore;
use crate::telemetry::StatusCode;
use crate::types::{EmergenceType, PatternEvolutionPrediction};

/// Horizon of the evolution time estimate, in minutes
const EVOLUTION_HORIZON_MINUTES: f64 = 30.0;

/// Confidence multiplier per strong sub-pattern
const STRONG_PATTERN_DAMPING: f64 = 0.9;

/// Window and threshold settings
#[derive(Debug, Clone)]
pub struct TrendPredictorConfig {
    pub pattern_window: usize,
    pub evolution_threshold: f64,
}

impl Default for TrendPredictorConfig {
    fn default() -> Self {
        Self {
            pattern_window: 10,
            evolution_threshold: 0.85,
        }
    }
}

/// Per-pattern-type evolution forecaster
pub struct TrendPredictor {
    config: TrendPredictorConfig,
    windows: Mutex<HashMap<String, VecDeque<TrendSample>>>,
}

impl TrendPredictor {
    pub fn new(config: TrendPredictorConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TrendPredictorConfig {
        &self.config
    }

    /// Health metrics of one sample
    pub fn analyze_pattern_state(sample: &TrendSample) -> StateAnalysis {
        let mut stability = 1.0;
        if !sample.is_optimal() {
            stability *= 0.7;
        }
        if !sample.flow_state.connected {
            stability *= 0.5;
        }

        let efficiency = sample.neural_resources.efficiency / 100.0;
        let resource_pressure = if efficiency > 0.0 { 1.0 - (-efficiency).exp() } else { 0.0 };

        let latency = sample.flow_state.latency;
        let flow_health = if latency > 0.0 { (-latency / 100.0).exp() } else { 1.0 };

        StateAnalysis {
            stability,
            resource_pressure,
            flow_health,
            overall_health: (stability + flow_health + (1.0 - resource_pressure)) / 3.0,
        }
    }

    /// Trends over the last `pattern_window` samples; empty until the window fills
    pub fn detect_patterns(&self, history: &[TrendSample]) -> Vec<DetectedPattern> {
        let window = self.config.pattern_window;
        if window == 0 || history.len() < window {
            return Vec::new();
        }
        let recent = &history[history.len() - window..];

        let resource = ols_slope(&recent.iter().map(|s| s.neural_resources.efficiency).collect::<Vec<_>>());
        let health = ols_slope(
            &recent
                .iter()
                .map(|s| if s.is_optimal() { 1.0 } else { 0.5 })
                .collect::<Vec<_>>(),
        );
        let flow = ols_slope(
            &recent
                .iter()
                .map(|s| if s.flow_state.connected { 1.0 } else { 0.0 })
                .collect::<Vec<_>>(),
        );

        let detected = |kind, slope: f64, up: &str, down: &str| DetectedPattern {
            kind,
            confidence: slope.abs(),
            direction: (if slope > 0.0 { up } else { down }).to_string(),
        };

        vec![
            detected(PatternKind::ResourceEvolution, resource, "increasing", "decreasing"),
            detected(PatternKind::HealthEvolution, health, "improving", "degrading"),
            detected(PatternKind::FlowEvolution, flow, "strengthening", "weakening"),
        ]
    }

    /// Push `sample` into its window and forecast the pattern's evolution
    pub fn predict_evolution(&self, pattern_type: &str, sample: TrendSample) -> Result<PatternEvolutionPrediction> {
        let analysis = Self::analyze_pattern_state(&sample);

        let history: Vec<TrendSample> = {
            let mut windows = self
                .windows
                .lock()
                .map_err(|_| EngineError::Generic("trend window lock poisoned".to_string()))?;
            let window = windows.entry(pattern_type.to_string()).or_default();
            window.push_back(sample);
            while window.len() > self.config.pattern_window.max(1) {
                window.pop_front();
            }
            window.iter().cloned().collect()
        };

        let patterns = self.detect_patterns(&history);

        let strong = patterns
            .iter()
            .filter(|p| p.confidence > self.config.evolution_threshold)
            .count();
        let confidence = analysis.overall_health * STRONG_PATTERN_DAMPING.powi(strong as i32);

        let minutes = (EVOLUTION_HORIZON_MINUTES * (1.0 - confidence)) as i64;
        let emergence_type = self.determine_emergence_type(&analysis, &patterns);

        debug!(
            pattern_type,
            confidence,
            emergence_type = %emergence_type,
            window_len = history.len(),
            "Pattern evolution predicted"
        );

        Ok(PatternEvolutionPrediction {
            pattern_type: pattern_type.to_string(),
            evolution_confidence: confidence,
            evolution_time: Utc::now() + ChronoDuration::minutes(minutes),
            emergence_type,
            pattern_signature: serde_json::to_string(&patterns)?,
            neural_state: serde_json::to_string(&analysis)?,
            flow_metrics: serde_json::to_string(&serde_json::json!({
                "stability": analysis.stability,
                "flow_health": analysis.flow_health,
            }))?,
        })
    }

    /// Classify the evolution from the current state and detected trends
    pub fn determine_emergence_type(&self, analysis: &StateAnalysis, patterns: &[DetectedPattern]) -> EmergenceType {
        if analysis.overall_health < 0.5 {
            return EmergenceType::Degradation;
        }

        if patterns.iter().any(|p| p.confidence > self.config.evolution_threshold) {
            if analysis.resource_pressure > 0.8 {
                EmergenceType::ResourceOptimization
            } else if analysis.flow_health < 0.7 {
                EmergenceType::FlowEnhancement
            } else {
                EmergenceType::PatternEvolution
            }
        } else {
            EmergenceType::StableOperation
        }
    }

    /// Number of samples currently held for a pattern type
    pub fn window_len(&self, pattern_type: &str) -> usize {
        self.windows
            .lock()
            .map(|w| w.get(pattern_type).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Persist and forecast every sample of one source read.
    ///
    /// Returns the number of forecasts stored; a failing sample is logged and
    /// the rest of the batch still runs.
    pub fn run_cycle(&self, store: &EventStore, samples: Vec<(TrendSample, serde_json::Value)>) -> usize {
        let mut stored = 0;

        for (sample, raw) in samples {
            let pattern_type = sample.pattern_type.clone();

            if let Err(e) = store.record_pattern_state(&pattern_type, &raw) {
                warn!(error = %e, pattern_type = %pattern_type, "Failed to store pattern state");
            }

            let outcome = self
                .predict_evolution(&pattern_type, sample)
                .and_then(|prediction| store.record_evolution(&prediction));

            match outcome {
                Ok(_) => stored += 1,
                Err(e) => error!(
                    error = %e,
                    pattern_type = %pattern_type,
                    status_code = %StatusCode::Failed,
                    "Failed to predict pattern evolution"
                ),
            }
        }

        stored
    }

    /// Sampling loop: read the source every `period` and forecast each sample
    pub async fn run(
        self: Arc<Self>,
        store: Arc<EventStore>,
        source: Arc<dyn TrendSource>,
        period: Duration,
        mut shutdown: ShutdownSignal,
    ) {
        info!(source = source.name(), "Trend prediction loop started");

        loop {
            if shutdown.is_triggered() {
                break;
            }

            match source.read().await {
                Ok(samples) => {
                    let count = samples.len();
                    let stored = self.run_cycle(&store, samples);
                    debug!(samples = count, stored, "Trend prediction cycle complete");
                }
                Err(e) => error!(
                    error = %e,
                    source = source.name(),
                    status_code = %StatusCode::Degraded,
                    "Error in prediction cycle"
                ),
            }

            if shutdown.sleep(period).await {
                break;
            }
        }

        info!("Trend prediction loop stopped");
    }
}

/// Least-squares slope of `values` against x = 0..n-1; 0 below two points
pub fn ols_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;

    let (numerator, denominator) = values.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::types::{FlowState, HealthState, ResourceState};

    fn sample(status: &str, connected: bool, latency: f64, efficiency: f64) -> TrendSample {
        TrendSample {
            pattern_type: "inference".to_string(),
            neural_health: HealthState {
                status: status.to_string(),
            },
            flow_state: FlowState { connected, latency },
            neural_resources: ResourceState { efficiency },
        }
    }

    #[test]
    fn test_healthy_state_analysis() {
        let analysis = TrendPredictor::analyze_pattern_state(&sample("optimal", true, 0.0, 0.0));
        assert_eq!(analysis.stability, 1.0);
        assert_eq!(analysis.resource_pressure, 0.0);
        assert_eq!(analysis.flow_health, 1.0);
        assert_eq!(analysis.overall_health, 1.0);
    }

    #[test]
    fn test_degraded_state_analysis() {
        let analysis = TrendPredictor::analyze_pattern_state(&sample("degraded", false, 100.0, 100.0));
        assert!((analysis.stability - 0.35).abs() < 1e-9);
        assert!((analysis.flow_health - (-1.0f64).exp()).abs() < 1e-9);
        assert!((analysis.resource_pressure - (1.0 - (-1.0f64).exp())).abs() < 1e-9);
    }

    #[test]
    fn test_ols_slope() {
        assert_eq!(ols_slope(&[]), 0.0);
        assert_eq!(ols_slope(&[3.0]), 0.0);
        assert!((ols_slope(&[1.0, 2.0, 3.0, 4.0]) - 1.0).abs() < 1e-9);
        assert!((ols_slope(&[5.0, 5.0, 5.0]) - 0.0).abs() < 1e-9);
        assert!((ols_slope(&[6.0, 4.0, 2.0]) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_patterns_before_window_fills() {
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());
        let history: Vec<_> = (0..9).map(|i| sample("optimal", true, 0.0, i as f64)).collect();
        assert!(predictor.detect_patterns(&history).is_empty());
    }

    #[test]
    fn test_increasing_efficiency_detected() {
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());
        let history: Vec<_> = (0..10).map(|i| sample("optimal", true, 0.0, i as f64 * 10.0)).collect();

        let patterns = predictor.detect_patterns(&history);
        let resource = patterns
            .iter()
            .find(|p| p.kind == PatternKind::ResourceEvolution)
            .unwrap();
        assert_eq!(resource.direction, "increasing");
        assert!(resource.confidence > 0.0);
    }

    #[test]
    fn test_constant_efficiency_has_no_trend() {
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());
        let history: Vec<_> = (0..10).map(|_| sample("optimal", true, 0.0, 40.0)).collect();

        let patterns = predictor.detect_patterns(&history);
        assert!(patterns.iter().all(|p| p.confidence.abs() < 1e-9));
    }

    #[test]
    fn test_low_health_is_degradation() {
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());
        let analysis = StateAnalysis {
            stability: 0.3,
            resource_pressure: 0.7,
            flow_health: 0.3,
            overall_health: 0.3,
        };
        assert_eq!(predictor.determine_emergence_type(&analysis, &[]), EmergenceType::Degradation);
    }

    #[test]
    fn test_emergence_decision_table() {
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());
        let strong = vec![DetectedPattern {
            kind: PatternKind::ResourceEvolution,
            confidence: 5.0,
            direction: "increasing".to_string(),
        }];
        let state = |pressure: f64, flow: f64| StateAnalysis {
            stability: 1.0,
            resource_pressure: pressure,
            flow_health: flow,
            overall_health: 0.6,
        };

        assert_eq!(
            predictor.determine_emergence_type(&state(0.9, 1.0), &strong),
            EmergenceType::ResourceOptimization
        );
        assert_eq!(
            predictor.determine_emergence_type(&state(0.1, 0.5), &strong),
            EmergenceType::FlowEnhancement
        );
        assert_eq!(
            predictor.determine_emergence_type(&state(0.1, 0.9), &strong),
            EmergenceType::PatternEvolution
        );
        assert_eq!(
            predictor.determine_emergence_type(&state(0.1, 0.9), &[]),
            EmergenceType::StableOperation
        );
    }

    #[test]
    fn test_window_is_bounded() {
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());
        for i in 0..25 {
            predictor
                .predict_evolution("inference", sample("optimal", true, 0.0, i as f64))
                .unwrap();
        }
        assert_eq!(predictor.window_len("inference"), 10);
        assert_eq!(predictor.window_len("storage"), 0);
    }

    #[test]
    fn test_strong_trend_damps_confidence() {
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());
        let mut last = None;
        for i in 0..10 {
            last = Some(
                predictor
                    .predict_evolution("inference", sample("optimal", true, 0.0, i as f64 * 10.0))
                    .unwrap(),
            );
        }
        let prediction = last.unwrap();

        let analysis = TrendPredictor::analyze_pattern_state(&sample("optimal", true, 0.0, 90.0));
        assert!((prediction.evolution_confidence - analysis.overall_health * 0.9).abs() < 1e-9);
        assert_eq!(prediction.emergence_type, EmergenceType::PatternEvolution);
        assert!(prediction.evolution_time > Utc::now());
    }

    #[test]
    fn test_run_cycle_persists_history_and_forecasts() {
        let store = EventStore::open_in_memory().unwrap();
        let predictor = TrendPredictor::new(TrendPredictorConfig::default());

        let s = sample("optimal", true, 5.0, 20.0);
        let raw = serde_json::to_value(&s).unwrap();
        assert_eq!(predictor.run_cycle(&store, vec![(s, raw)]), 1);

        assert_eq!(store.pattern_history_len("inference").unwrap(), 1);
        let evolutions = store.recent_evolutions(5).unwrap();
        assert_eq!(evolutions.len(), 1);
        assert_eq!(evolutions[0].emergence_type, EmergenceType::StableOperation);
    }
}
