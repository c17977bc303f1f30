//! Engine wiring
//!
//! Owns the store and every component, and runs the four background loops:
//! pattern analysis, anomaly prediction, trend prediction and recovery
//! monitoring. Loops talk through the bounded learning queue and the
//! learner's solution cache; shutdown is a watch signal checked at the top
//! of every iteration.

pub mod shutdown;

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cli::config::{Config, ProbeKind};
use crate::errors::{EngineError, Result};
use crate::learning::{LearnerConfig, PatternLearner};
use crate::prediction::{
    AnomalyConfig, AnomalyPredictor, ForestConfig, HostSource, SummaryFileSource, TrendPredictor,
    TrendPredictorConfig, TrendSource,
};
use crate::recovery::{
    CommandControlPlane, CommandProbe, ControlPlane, HealthProbe, HttpProbe, MonitoredTarget, RecoveryOrchestrator,
};
use crate::store::EventStore;
use crate::types::FailureEvent;

pub use shutdown::{ShutdownSignal, ShutdownTrigger};

/// The assembled failure learning and prediction engine
pub struct FailureEngine {
    config: Config,
    store: Arc<EventStore>,
    learner: Arc<PatternLearner>,
    anomaly: Arc<AnomalyPredictor>,
    trend: Arc<TrendPredictor>,
    events_tx: mpsc::Sender<FailureEvent>,
    events_rx: Option<mpsc::Receiver<FailureEvent>>,
    trigger: ShutdownTrigger,
    signal: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

impl FailureEngine {
    /// Open the configured store and build every component.
    ///
    /// Failing to open the store is the only fatal startup error.
    pub fn open(config: Config) -> Result<Self> {
        let store = Arc::new(EventStore::open(config.db_path())?);
        Ok(Self::with_store(config, store))
    }

    /// Build the engine over an already-open store
    pub fn with_store(config: Config, store: Arc<EventStore>) -> Self {
        let learner = Arc::new(PatternLearner::new(
            store.clone(),
            LearnerConfig {
                min_success_rate: config.learning.min_success_rate,
                min_confidence: config.learning.min_confidence,
            },
        ));
        let anomaly = Arc::new(AnomalyPredictor::new(store.clone(), anomaly_config(&config)));
        let trend = Arc::new(TrendPredictor::new(TrendPredictorConfig {
            pattern_window: config.trend.pattern_window,
            evolution_threshold: config.trend.evolution_threshold,
        }));

        let (events_tx, events_rx) = mpsc::channel(config.learning.queue_capacity.max(1));
        let (trigger, signal) = shutdown::channel();

        Self {
            config,
            store,
            learner,
            anomaly,
            trend,
            events_tx,
            events_rx: Some(events_rx),
            trigger,
            signal,
            handles: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn learner(&self) -> &Arc<PatternLearner> {
        &self.learner
    }

    pub fn anomaly(&self) -> &Arc<AnomalyPredictor> {
        &self.anomaly
    }

    pub fn trend(&self) -> &Arc<TrendPredictor> {
        &self.trend
    }

    /// Whether the background loops are running
    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Probe per configured service
    pub fn configured_targets(&self) -> Result<Vec<MonitoredTarget>> {
        let timeout = self.config.request_timeout();

        self.config
            .recovery
            .services
            .iter()
            .map(|service| {
                let probe: Arc<dyn HealthProbe> = match (service.probe, &service.url) {
                    (ProbeKind::Http, Some(url)) => Arc::new(HttpProbe::new(url.clone(), timeout)?),
                    _ => Arc::new(CommandProbe::new(self.config.recovery.probe_command.clone(), timeout)),
                };
                Ok(MonitoredTarget::new(service.service.clone(), service.container_id.clone(), probe))
            })
            .collect()
    }

    /// Control plane from the configured command template
    pub fn configured_control(&self) -> Arc<dyn ControlPlane> {
        Arc::new(CommandControlPlane::new(
            self.config.recovery.control_command.clone(),
            self.config.request_timeout(),
        ))
    }

    /// Summary file source when configured, host metrics otherwise
    pub fn configured_source(&self) -> Arc<dyn TrendSource> {
        match &self.config.trend.summary_path {
            Some(path) => Arc::new(SummaryFileSource::new(Config::expand_path(path))),
            None => Arc::new(HostSource::new()),
        }
    }

    /// Start the four loops with the configured collaborators
    pub fn start(&mut self) -> Result<()> {
        let control = self.configured_control();
        let targets = self.configured_targets()?;
        let source = self.configured_source();
        self.start_with(control, targets, source)
    }

    /// Start the four loops with explicit collaborators
    pub fn start_with(
        &mut self,
        control: Arc<dyn ControlPlane>,
        targets: Vec<MonitoredTarget>,
        source: Arc<dyn TrendSource>,
    ) -> Result<()> {
        let events_rx = self
            .events_rx
            .take()
            .ok_or_else(|| EngineError::Generic("engine already started".to_string()))?;

        let orchestrator = Arc::new(
            RecoveryOrchestrator::new(
                self.store.clone(),
                self.learner.clone(),
                control,
                targets,
                self.events_tx.clone(),
            )
            .with_default_attempt(self.config.recovery.attempt_without_solution),
        );

        self.handles.push(tokio::spawn(self.learner.clone().run(
            events_rx,
            self.config.idle_timeout(),
            self.config.training_interval(),
            self.signal.clone(),
        )));
        self.handles.push(tokio::spawn(self.anomaly.clone().run(
            self.config.prediction_period(),
            self.config.training_interval(),
            self.signal.clone(),
        )));
        self.handles.push(tokio::spawn(self.trend.clone().run(
            self.store.clone(),
            source,
            self.config.trend_period(),
            self.signal.clone(),
        )));
        self.handles.push(tokio::spawn(
            orchestrator.run(self.config.poll_period(), self.signal.clone()),
        ));

        info!(loops = self.handles.len(), "Failure engine started");
        Ok(())
    }

    /// Record an event and, when its outcome is already known, queue it for learning
    pub async fn submit(&self, event: FailureEvent) -> Result<i64> {
        let id = self.store.record_failure(&event)?;
        if event.recovery.is_some() {
            self.learn(event).await?;
        }
        Ok(id)
    }

    /// Attach an operator-reported outcome to a stored event and learn from it.
    ///
    /// Fails with `RecoveryAlreadyRecorded` when the event already has an
    /// outcome; nothing is learned in that case.
    pub async fn report_recovery(&self, event_id: i64, attempt: &str, success: bool, duration_secs: f64) -> Result<()> {
        self.store.update_recovery(event_id, attempt, success, duration_secs)?;

        let recorded = self
            .store
            .get_event(event_id)?
            .ok_or(EngineError::EventNotFound(event_id))?;

        info!(event_id, success, "Recovery outcome reported");
        self.learn(recorded.event).await
    }

    /// Queue to the running learner, or record directly when the loops are stopped
    async fn learn(&self, event: FailureEvent) -> Result<()> {
        if self.is_running() {
            self.events_tx
                .send(event)
                .await
                .map_err(|e| EngineError::QueueError(e.to_string()))
        } else {
            self.learner.record(&event)
        }
    }

    /// Another signal observing this engine's shutdown
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.trigger.subscribe()
    }

    /// Signal every loop and wait for them to finish
    pub async fn shutdown(&mut self) {
        self.trigger.trigger();

        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background loop ended abnormally");
            }
        }
        info!("Failure engine stopped");
    }
}

fn anomaly_config(config: &Config) -> AnomalyConfig {
    let prediction = &config.prediction;
    AnomalyConfig {
        forest: ForestConfig {
            n_trees: prediction.n_trees,
            max_samples: prediction.max_samples,
            contamination: prediction.contamination,
            seed: prediction.seed,
        },
        prediction_window_secs: prediction.prediction_window_secs as f64,
        lookback_secs: prediction.lookback_secs as f64,
        training_history_secs: prediction.training_history_secs as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::MonitoredService;
    use serde_json::json;

    fn engine() -> FailureEngine {
        FailureEngine::with_store(Config::default(), Arc::new(EventStore::open_in_memory().unwrap()))
    }

    #[test]
    fn test_configured_targets_follow_config() {
        let mut config = Config::default();
        config.recovery.services.push(MonitoredService {
            service: "gateway".to_string(),
            container_id: "gw".to_string(),
            probe: ProbeKind::Http,
            url: Some("http://127.0.0.1:8080/health".to_string()),
        });
        let engine = FailureEngine::with_store(config, Arc::new(EventStore::open_in_memory().unwrap()));

        let targets = engine.configured_targets().unwrap();
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[0].service, "ollama");
        assert_eq!(targets[3].container_id, "gw");
    }

    #[tokio::test]
    async fn test_report_recovery_learns_when_stopped() {
        let engine = engine();
        let id = engine
            .submit(FailureEvent::new("qdrant", "201", "container_inactive", "stopped", json!({})))
            .await
            .unwrap();
        assert!(engine.store().get_pattern("qdrant:container_inactive:201").unwrap().is_none());

        engine.report_recovery(id, "restart cmd", true, 2.0).await.unwrap();

        let pattern = engine
            .store()
            .get_pattern("qdrant:container_inactive:201")
            .unwrap()
            .unwrap();
        assert_eq!(pattern.success_count, 1);
        assert_eq!(pattern.best_solution.as_deref(), Some("restart cmd"));
    }

    #[tokio::test]
    async fn test_second_report_is_rejected() {
        let engine = engine();
        let id = engine
            .submit(FailureEvent::new("qdrant", "201", "container_inactive", "stopped", json!({})))
            .await
            .unwrap();

        engine.report_recovery(id, "restart cmd", true, 2.0).await.unwrap();
        assert!(matches!(
            engine.report_recovery(id, "start cmd", false, 1.0).await,
            Err(EngineError::RecoveryAlreadyRecorded(i)) if i == id
        ));

        let pattern = engine
            .store()
            .get_pattern("qdrant:container_inactive:201")
            .unwrap()
            .unwrap();
        assert_eq!(pattern.success_count, 1);
        assert_eq!(pattern.fail_count, 0);
        assert_eq!(engine.store().query_recent(0.0).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_already_attempted_event_cannot_be_reported() {
        let engine = engine();
        let id = engine
            .submit(
                FailureEvent::new("ollama", "200", "container_inactive", "stopped", json!({}))
                    .with_recovery("start cmd", true, 1.0),
            )
            .await
            .unwrap();

        assert!(engine.report_recovery(id, "start cmd", true, 1.0).await.is_err());
        let pattern = engine
            .store()
            .get_pattern("ollama:container_inactive:200")
            .unwrap()
            .unwrap();
        assert_eq!(pattern.total(), 1);
    }

    #[tokio::test]
    async fn test_report_unknown_event() {
        let engine = engine();
        assert!(matches!(
            engine.report_recovery(999, "restart cmd", true, 1.0).await,
            Err(EngineError::EventNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut engine = engine();
        let control = engine.configured_control();
        let source: Arc<dyn TrendSource> = Arc::new(HostSource::new());

        engine.start_with(control.clone(), Vec::new(), source.clone()).unwrap();
        assert!(engine.is_running());
        assert!(engine.start_with(control, Vec::new(), source).is_err());

        engine.shutdown().await;
        assert!(!engine.is_running());
    }
}
