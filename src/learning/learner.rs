//! Pattern learner: event ingestion, periodic scans and the solution cache

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

use crate::engine::shutdown::ShutdownSignal;
use crate::errors::Result;
use crate::learning::confidence::{confidence_features, predicted_success_probability, score_confidences};
use crate::store::EventStore;
use crate::telemetry::StatusCode;
use crate::types::{now_secs, pattern_key, FailureEvent};

/// Solution cache promotion thresholds
#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Success rate a pattern must exceed
    pub min_success_rate: f64,

    /// Confidence a pattern must exceed
    pub min_confidence: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            min_success_rate: 0.8,
            min_confidence: 0.7,
        }
    }
}

/// A trusted remedy for one pattern
#[derive(Debug, Clone, PartialEq)]
pub struct RecoverySolution {
    pub pattern_key: String,

    /// Remedy text or command that last resolved the failure
    pub solution: String,

    /// Confidence computed during the last scan
    pub confidence: f64,

    /// Blend of historical success rate and confidence
    pub predicted_success_rate: f64,
}

/// Outcome of one scan over the learned patterns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    /// Patterns with at least one occurrence
    pub scanned: usize,

    /// Patterns with no defined confidence
    pub skipped: usize,

    /// Patterns now in the solution cache
    pub cached: usize,
}

/// Learns which remedies work for which failure signatures
pub struct PatternLearner {
    store: Arc<EventStore>,
    cache: RwLock<HashMap<String, RecoverySolution>>,
    config: LearnerConfig,
}

impl PatternLearner {
    /// Create a learner over a store with an empty cache
    pub fn new(store: Arc<EventStore>, config: LearnerConfig) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Fold one finished event into its pattern statistics
    pub fn record(&self, event: &FailureEvent) -> Result<()> {
        self.store.upsert_pattern(event)?;

        debug!(
            pattern_key = %event.pattern_key(),
            success = ?event.recovery_success(),
            "Pattern statistics updated"
        );
        if event.recovery_success() == Some(true) {
            info!(
                pattern_key = %event.pattern_key(),
                solution = event.recovery_attempt().unwrap_or_default(),
                "Updated best solution for pattern"
            );
        }
        Ok(())
    }

    /// Rescore every pattern and rebuild the solution cache from scratch.
    ///
    /// A pattern is cached iff its success rate and its confidence both
    /// exceed the configured thresholds; anything else drops out.
    pub async fn analyze_patterns(&self) -> Result<AnalysisReport> {
        let now = now_secs();
        let patterns = self.store.all_patterns()?;

        let (seen, rows): (Vec<_>, Vec<_>) = patterns
            .into_iter()
            .filter_map(|p| confidence_features(&p, now).map(|row| (p, row)))
            .unzip();
        let scores = score_confidences(&rows);

        let mut report = AnalysisReport {
            scanned: seen.len(),
            ..Default::default()
        };
        let mut rebuilt = HashMap::new();

        for ((mut pattern, row), score) in seen.into_iter().zip(rows.iter()).zip(scores) {
            let Some(confidence) = score else {
                report.skipped += 1;
                continue;
            };

            self.store.update_pattern_scores(&pattern.pattern_key, row, confidence)?;
            pattern.confidence = Some(confidence);

            let success_rate = pattern.success_rate().unwrap_or(0.0);
            if success_rate <= self.config.min_success_rate || confidence <= self.config.min_confidence {
                continue;
            }
            let Some(solution) = pattern.best_solution.clone() else {
                continue;
            };

            info!(
                pattern_key = %pattern.pattern_key,
                success_rate,
                confidence,
                status_code = %StatusCode::Operational,
                "Pattern added to solution cache"
            );
            rebuilt.insert(
                pattern.pattern_key.clone(),
                RecoverySolution {
                    pattern_key: pattern.pattern_key.clone(),
                    solution,
                    confidence,
                    predicted_success_rate: predicted_success_probability(&pattern),
                },
            );
        }

        report.cached = rebuilt.len();
        *self.cache.write().await = rebuilt;

        info!(scanned = report.scanned, cached = report.cached, "Periodic pattern analysis complete");
        Ok(report)
    }

    /// Cached remedy for a signature; `None` means no proven remedy yet
    pub async fn get_recovery_solution(
        &self,
        service: &str,
        error_type: &str,
        container_id: &str,
    ) -> Option<RecoverySolution> {
        let key = pattern_key(service, error_type, container_id);
        let solution = self.cache.read().await.get(&key).cloned();

        debug!(pattern_key = %key, found = solution.is_some(), "Solution cache lookup");
        solution
    }

    /// Number of cached remedies
    pub async fn cache_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Ingestion loop.
    ///
    /// Records queued events as they arrive; when the queue stays idle for
    /// `idle_timeout` (or a scan is overdue by `scan_interval`) the patterns
    /// are rescanned. Errors are logged and the loop keeps going.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<FailureEvent>,
        idle_timeout: Duration,
        scan_interval: Duration,
        mut shutdown: ShutdownSignal,
    ) {
        info!("Pattern analysis loop started");
        let mut last_scan = Instant::now();

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let received = tokio::select! {
                received = tokio::time::timeout(idle_timeout, events.recv()) => received,
                _ = shutdown.cancelled() => break,
            };

            match received {
                Ok(Some(event)) => {
                    if let Err(e) = self.record(&event) {
                        error!(
                            error = %e,
                            pattern_key = %event.pattern_key(),
                            status_code = %StatusCode::Failed,
                            "Failed to record event pattern"
                        );
                    }
                }
                Ok(None) => {
                    info!("Event queue closed");
                    break;
                }
                Err(_) => {
                    self.scan_logged().await;
                    last_scan = Instant::now();
                    continue;
                }
            }

            if last_scan.elapsed() >= scan_interval {
                self.scan_logged().await;
                last_scan = Instant::now();
            }
        }

        info!("Pattern analysis loop stopped");
    }

    async fn scan_logged(&self) {
        if let Err(e) = self.analyze_patterns().await {
            error!(error = %e, status_code = %StatusCode::Failed, "Error in background analysis");
        }
    }
}
