//! Recovery orchestrator
//!
//! Polls every monitored service, records a failure event for each one found
//! unhealthy and runs the cached remedy through the control plane. A store
//! outage does not stop recovery: the cache is in memory, so lookups and
//! attempts continue in degraded mode.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::shutdown::ShutdownSignal;
use crate::learning::PatternLearner;
use crate::prediction::features::capture_system_state;
use crate::recovery::control::ControlPlane;
use crate::recovery::probe::HealthProbe;
use crate::recovery::types::{PollOutcome, RecoveryAction, CONTAINER_INACTIVE};
use crate::store::EventStore;
use crate::telemetry::StatusCode;
use crate::types::FailureEvent;

/// A (service, container) pair and the probe that checks it
#[derive(Clone)]
pub struct MonitoredTarget {
    pub service: String,
    pub container_id: String,
    pub probe: Arc<dyn HealthProbe>,
}

impl MonitoredTarget {
    pub fn new(service: impl Into<String>, container_id: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            service: service.into(),
            container_id: container_id.into(),
            probe,
        }
    }
}

/// Probe, record and remediate
pub struct RecoveryOrchestrator {
    store: Arc<EventStore>,
    learner: Arc<PatternLearner>,
    control: Arc<dyn ControlPlane>,
    targets: Vec<MonitoredTarget>,
    events: mpsc::Sender<FailureEvent>,
    attempt_without_solution: bool,
}

impl RecoveryOrchestrator {
    pub fn new(
        store: Arc<EventStore>,
        learner: Arc<PatternLearner>,
        control: Arc<dyn ControlPlane>,
        targets: Vec<MonitoredTarget>,
        events: mpsc::Sender<FailureEvent>,
    ) -> Self {
        Self {
            store,
            learner,
            control,
            targets,
            events,
            attempt_without_solution: false,
        }
    }

    /// Run a plain "start" when no remedy is cached
    pub fn with_default_attempt(mut self, enabled: bool) -> Self {
        self.attempt_without_solution = enabled;
        self
    }

    pub fn targets(&self) -> &[MonitoredTarget] {
        &self.targets
    }

    /// Visit every target once, in order
    pub async fn poll_once(&self) -> Vec<PollOutcome> {
        let mut outcomes = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            outcomes.push(self.poll_target(target).await);
        }
        outcomes
    }

    async fn poll_target(&self, target: &MonitoredTarget) -> PollOutcome {
        let status = target.probe.probe(&target.container_id).await;
        if status.is_healthy() {
            debug!(service = %target.service, container_id = %target.container_id, "Service healthy");
            return PollOutcome::Healthy;
        }

        warn!(
            service = %target.service,
            container_id = %target.container_id,
            status = %status.status,
            status_code = %StatusCode::Degraded,
            "Container is not running"
        );

        let snapshot = tokio::task::spawn_blocking(capture_system_state)
            .await
            .unwrap_or_else(|_| serde_json::json!({}));

        let event = FailureEvent::new(
            target.service.clone(),
            target.container_id.clone(),
            CONTAINER_INACTIVE,
            status.describe(&target.container_id),
            snapshot,
        );

        let event_id = match self.store.record_failure(&event) {
            Ok(id) => Some(id),
            Err(e) => {
                error!(
                    error = %e,
                    service = %target.service,
                    status_code = %StatusCode::Degraded,
                    "Failed to record failure event, continuing without persistence"
                );
                None
            }
        };

        let solution = self
            .learner
            .get_recovery_solution(&target.service, CONTAINER_INACTIVE, &target.container_id)
            .await;

        let action = match &solution {
            Some(solution) => RecoveryAction::for_solution(&solution.solution),
            None if self.attempt_without_solution => RecoveryAction::Start,
            None => {
                info!(
                    service = %target.service,
                    container_id = %target.container_id,
                    "No learned solution, failure recorded without recovery attempt"
                );
                return PollOutcome::Recorded { event_id };
            }
        };

        info!(
            service = %target.service,
            container_id = %target.container_id,
            action = %action,
            predicted_success_rate = solution.as_ref().map(|s| s.predicted_success_rate),
            status_code = %StatusCode::Recovering,
            "Attempting recovery"
        );

        let started = Instant::now();
        let outcome = self.control.execute(&target.container_id, action).await;
        let duration = started.elapsed().as_secs_f64();

        if outcome.success {
            info!(
                service = %target.service,
                command = %outcome.command,
                duration,
                status_code = %StatusCode::Operational,
                "Recovery succeeded"
            );
        } else {
            error!(
                service = %target.service,
                command = %outcome.command,
                output = %outcome.output.trim(),
                status_code = %StatusCode::Failed,
                "Recovery failed"
            );
        }

        if let Some(id) = event_id {
            if let Err(e) = self.store.update_recovery(id, &outcome.command, outcome.success, duration) {
                error!(error = %e, event_id = id, status_code = %StatusCode::Degraded, "Failed to store recovery outcome");
            }
        }

        let finished = event.with_recovery(outcome.command, outcome.success, duration);
        if self.events.send(finished).await.is_err() {
            warn!(service = %target.service, "Learning queue closed, outcome not learned");
        }

        PollOutcome::Attempted {
            event_id,
            action,
            success: outcome.success,
        }
    }

    /// Poll loop, one pass every `period`
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: ShutdownSignal) {
        info!(targets = self.targets.len(), "Recovery monitoring started");

        loop {
            if shutdown.is_triggered() {
                break;
            }

            let outcomes = self.poll_once().await;
            let unhealthy = outcomes.iter().filter(|o| **o != PollOutcome::Healthy).count();
            debug!(unhealthy, "Recovery poll complete");

            if shutdown.sleep(period).await {
                break;
            }
        }

        info!("Recovery monitoring stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::LearnerConfig;
    use crate::recovery::types::{ControlOutcome, ServiceStatus};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedProbe(ServiceStatus);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        async fn probe(&self, _container_id: &str) -> ServiceStatus {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<(String, RecoveryAction)>>,
        fail: bool,
    }

    #[async_trait]
    impl ControlPlane for RecordingControl {
        async fn execute(&self, container_id: &str, action: RecoveryAction) -> ControlOutcome {
            self.calls.lock().unwrap().push((container_id.to_string(), action));
            ControlOutcome {
                success: !self.fail,
                command: format!("ctl {} {}", action, container_id),
                output: String::new(),
            }
        }
    }

    struct Fixture {
        orchestrator: RecoveryOrchestrator,
        store: Arc<EventStore>,
        learner: Arc<PatternLearner>,
        control: Arc<RecordingControl>,
        rx: mpsc::Receiver<FailureEvent>,
    }

    fn fixture(status: ServiceStatus, fail: bool) -> Fixture {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        let learner = Arc::new(PatternLearner::new(store.clone(), LearnerConfig::default()));
        let control = Arc::new(RecordingControl {
            fail,
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(16);

        let orchestrator = RecoveryOrchestrator::new(
            store.clone(),
            learner.clone(),
            control.clone(),
            vec![MonitoredTarget::new("ollama", "200", Arc::new(FixedProbe(status)))],
            tx,
        );

        Fixture {
            orchestrator,
            store,
            learner,
            control,
            rx,
        }
    }

    async fn teach(learner: &PatternLearner, remedy: &str) {
        for _ in 0..9 {
            let event = FailureEvent::new("ollama", "200", CONTAINER_INACTIVE, "stopped", serde_json::json!({}))
                .with_recovery(remedy, true, 1.0);
            learner.record(&event).unwrap();
        }
        learner.analyze_patterns().await.unwrap();
    }

    #[tokio::test]
    async fn test_healthy_service_records_nothing() {
        let f = fixture(ServiceStatus::running(), false);
        assert_eq!(f.orchestrator.poll_once().await, vec![PollOutcome::Healthy]);
        assert!(f.store.query_recent(0.0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_without_solution_records_only() {
        let mut f = fixture(ServiceStatus::stopped("stopped"), false);

        let outcomes = f.orchestrator.poll_once().await;
        assert!(matches!(outcomes[0], PollOutcome::Recorded { event_id: Some(_) }));

        let events = f.store.query_recent(0.0).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.error_type, CONTAINER_INACTIVE);
        assert!(events[0].event.recovery.is_none());
        assert!(f.control.calls.lock().unwrap().is_empty());
        assert!(f.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cached_restart_solution_is_applied() {
        let mut f = fixture(ServiceStatus::stopped("stopped"), false);
        teach(&f.learner, "restart cmd").await;

        let outcomes = f.orchestrator.poll_once().await;
        assert!(matches!(
            outcomes[0],
            PollOutcome::Attempted {
                action: RecoveryAction::Restart,
                success: true,
                ..
            }
        ));
        assert_eq!(
            f.control.calls.lock().unwrap().clone(),
            vec![("200".to_string(), RecoveryAction::Restart)]
        );

        let events = f.store.query_recent(0.0).unwrap();
        let recovery = events[0].event.recovery.clone().unwrap();
        assert!(recovery.success);
        assert_eq!(recovery.attempt, "ctl restart 200");
        assert!(recovery.duration_secs >= 0.0);

        let queued = f.rx.try_recv().unwrap();
        assert_eq!(queued.recovery_success(), Some(true));
    }

    #[tokio::test]
    async fn test_failed_attempt_is_recorded_as_failure() {
        let mut f = fixture(ServiceStatus::error("probe timed out"), true);
        teach(&f.learner, "start cmd").await;

        let outcomes = f.orchestrator.poll_once().await;
        assert!(matches!(
            outcomes[0],
            PollOutcome::Attempted {
                action: RecoveryAction::Start,
                success: false,
                ..
            }
        ));
        assert_eq!(f.rx.try_recv().unwrap().recovery_success(), Some(false));
    }

    #[tokio::test]
    async fn test_default_attempt_when_enabled() {
        let f = fixture(ServiceStatus::stopped("stopped"), false);
        let orchestrator = f.orchestrator.with_default_attempt(true);

        let outcomes = orchestrator.poll_once().await;
        assert!(matches!(
            outcomes[0],
            PollOutcome::Attempted {
                action: RecoveryAction::Start,
                ..
            }
        ));
    }
}
