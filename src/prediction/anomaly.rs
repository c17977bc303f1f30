//! Anomaly predictor
//!
//! Trains an isolation forest over one row per learned pattern and scores
//! the failures of the last lookback window, grouped by (service, container).
//!
//! Rows are `[success_rate, total, success_count, fail_count,
//! secs_since_last_seen, memory_usage_mb, load_avg_1m]`. Training rows
//! carry the mean snapshot of the pattern's recent events; scored rows carry
//! the event's own snapshot next to its pattern's statistics.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::engine::shutdown::ShutdownSignal;
use crate::errors::{EngineError, Result};
use crate::learning::confidence::anomaly_features;
use crate::prediction::features::extract_snapshot_features;
use crate::prediction::forest::{ForestConfig, IsolationForest};
use crate::store::EventStore;
use crate::telemetry::StatusCode;
use crate::types::predictions::PREDICTED_FAILURE;
use crate::types::{now_secs, FailurePrediction, LearnedPattern, RecordedEvent};

const PATTERN_WIDTH: usize = 5;

/// Training and scoring windows
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    pub forest: ForestConfig,
    /// Horizon scaled by confidence to get the predicted time
    pub prediction_window_secs: f64,
    /// Events newer than this are scored
    pub lookback_secs: f64,
    /// Events newer than this feed the training snapshot means
    pub training_history_secs: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            forest: ForestConfig::default(),
            prediction_window_secs: 3600.0,
            lookback_secs: 3600.0,
            training_history_secs: 86400.0,
        }
    }
}

/// Outlier-based failure forecaster
pub struct AnomalyPredictor {
    store: Arc<EventStore>,
    config: AnomalyConfig,
    model: RwLock<Option<IsolationForest>>,
}

impl AnomalyPredictor {
    pub fn new(store: Arc<EventStore>, config: AnomalyConfig) -> Self {
        Self {
            store,
            config,
            model: RwLock::new(None),
        }
    }

    /// Whether a model is available for scoring
    pub async fn is_trained(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// Retrain from scratch.
    ///
    /// Returns `false` when there was nothing to train on; the previous
    /// model, if any, stays in place.
    pub async fn train(&self) -> Result<bool> {
        let now = now_secs();
        let rows = self.training_rows(now)?;

        if rows.is_empty() {
            info!("No learned patterns yet, anomaly training skipped");
            return Ok(false);
        }

        let model = IsolationForest::fit(&rows, &self.config.forest)?;
        info!(rows = rows.len(), offset = model.offset(), "Anomaly model trained");
        *self.model.write().await = Some(model);
        Ok(true)
    }

    /// Score recent failures and persist a forecast for every group with an outlier
    pub async fn predict_failures(&self) -> Result<Vec<FailurePrediction>> {
        let guard = self.model.read().await;
        let model = guard.as_ref().ok_or(EngineError::ModelNotTrained)?;

        let now = now_secs();
        let events = self.store.query_recent(now - self.config.lookback_secs)?;
        let patterns = patterns_by_key(self.store.all_patterns()?);

        let mut groups: BTreeMap<(String, String), Vec<RecordedEvent>> = BTreeMap::new();
        for recorded in events {
            groups
                .entry((recorded.event.service.clone(), recorded.event.container_id.clone()))
                .or_default()
                .push(recorded);
        }

        let mut emitted = Vec::new();
        for ((service, container_id), group) in groups {
            let rows = scoring_rows(&group, &patterns, now);
            if rows.is_empty() {
                continue;
            }

            let scores = model.score_samples(&rows)?;
            if !scores.iter().any(|score| *score < model.offset()) {
                debug!(service = %service, container_id = %container_id, "No anomaly detected");
                continue;
            }

            let mean_score = scores.iter().sum::<f64>() / scores.len() as f64;
            let confidence = 1.0 - mean_score.exp() / 2.0;

            let mut prediction = FailurePrediction {
                id: None,
                timestamp: now,
                service,
                container_id,
                predicted_error_type: PREDICTED_FAILURE.to_string(),
                confidence,
                predicted_time: now + self.config.prediction_window_secs * confidence,
                was_correct: None,
            };
            prediction.id = Some(self.store.record_prediction(&prediction)?);

            warn!(
                service = %prediction.service,
                container_id = %prediction.container_id,
                confidence = prediction.confidence,
                predicted_time = prediction.predicted_time,
                status_code = %StatusCode::Degraded,
                "Potential failure predicted"
            );
            emitted.push(prediction);
        }

        Ok(emitted)
    }

    fn training_rows(&self, now: f64) -> Result<Vec<Vec<f64>>> {
        let history = self.store.query_recent(now - self.config.training_history_secs)?;

        let mut snapshot_sums: HashMap<String, ([f64; 2], usize)> = HashMap::new();
        for recorded in &history {
            if let Ok(features) = extract_snapshot_features(&recorded.event.system_state) {
                let entry = snapshot_sums.entry(recorded.event.pattern_key()).or_insert(([0.0; 2], 0));
                entry.0[0] += features[0];
                entry.0[1] += features[1];
                entry.1 += 1;
            }
        }

        Ok(self
            .store
            .all_patterns()?
            .iter()
            .filter_map(|pattern| {
                let mut row = anomaly_features(pattern, now)?;
                let snapshot = match snapshot_sums.get(&pattern.pattern_key) {
                    Some((sums, count)) if *count > 0 => [sums[0] / *count as f64, sums[1] / *count as f64],
                    _ => [0.0; 2],
                };
                row.extend_from_slice(&snapshot);
                Some(row)
            })
            .collect())
    }

    /// Prediction loop: retrain every `training_interval`, score every `period`
    pub async fn run(self: Arc<Self>, period: Duration, training_interval: Duration, mut shutdown: ShutdownSignal) {
        info!("Anomaly prediction loop started");
        let mut last_training: Option<Instant> = None;

        loop {
            if shutdown.is_triggered() {
                break;
            }

            if last_training.map_or(true, |at| at.elapsed() >= training_interval) {
                if let Err(e) = self.train().await {
                    error!(error = %e, status_code = %StatusCode::Failed, "Error training anomaly model");
                }
                last_training = Some(Instant::now());
            }

            match self.predict_failures().await {
                Ok(predictions) => debug!(emitted = predictions.len(), "Anomaly prediction cycle complete"),
                Err(EngineError::ModelNotTrained) => debug!("No anomaly model yet, prediction skipped"),
                Err(e) => error!(error = %e, status_code = %StatusCode::Failed, "Error in failure prediction"),
            }

            if shutdown.sleep(period).await {
                break;
            }
        }

        info!("Anomaly prediction loop stopped");
    }
}

fn patterns_by_key(patterns: Vec<LearnedPattern>) -> HashMap<String, LearnedPattern> {
    patterns.into_iter().map(|p| (p.pattern_key.clone(), p)).collect()
}

fn scoring_rows(group: &[RecordedEvent], patterns: &HashMap<String, LearnedPattern>, now: f64) -> Vec<Vec<f64>> {
    group
        .iter()
        .filter_map(|recorded| {
            let snapshot = match extract_snapshot_features(&recorded.event.system_state) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(event_id = recorded.id, error = %e, "Error extracting features");
                    return None;
                }
            };

            let mut row = patterns
                .get(&recorded.event.pattern_key())
                .and_then(|p| anomaly_features(p, now))
                .unwrap_or_else(|| vec![0.0; PATTERN_WIDTH]);
            row.extend_from_slice(&snapshot);
            Some(row)
        })
        .collect()
}
