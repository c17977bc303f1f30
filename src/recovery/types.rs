//! Recovery type definitions

use serde::{Deserialize, Serialize};

/// Error category recorded for services found not running
pub const CONTAINER_INACTIVE: &str = "container_inactive";

/// Coarse service state reported by a health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    Running,
    Stopped,
    Error,
}

impl ProbeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeState::Running => "running",
            ProbeState::Stopped => "stopped",
            ProbeState::Error => "error",
        }
    }

    /// Map a raw status string; anything starting with "running" is healthy
    pub fn from_status(status: &str) -> Self {
        if status.starts_with("running") {
            ProbeState::Running
        } else if status.is_empty() || status == "error" || status == "unknown" {
            ProbeState::Error
        } else {
            ProbeState::Stopped
        }
    }
}

/// Result of one health probe
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub state: ProbeState,

    /// Raw status text as reported by the probe
    pub status: String,

    /// CPU usage if reported
    pub cpu: Option<f64>,

    /// Memory in bytes if reported
    pub mem: Option<f64>,

    /// Probe failure detail
    pub error: Option<String>,
}

impl ServiceStatus {
    pub fn running() -> Self {
        Self {
            state: ProbeState::Running,
            status: ProbeState::Running.as_str().to_string(),
            cpu: None,
            mem: None,
            error: None,
        }
    }

    pub fn stopped(status: impl Into<String>) -> Self {
        Self {
            state: ProbeState::Stopped,
            status: status.into(),
            cpu: None,
            mem: None,
            error: None,
        }
    }

    /// Probe failure; the service counts as unhealthy
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            state: ProbeState::Error,
            status: ProbeState::Error.as_str().to_string(),
            cpu: None,
            mem: None,
            error: Some(detail.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state == ProbeState::Running
    }

    /// Failure description stored on the event
    pub fn describe(&self, container_id: &str) -> String {
        let fmt = |v: Option<f64>| v.map_or("N/A".to_string(), |v| v.to_string());
        let mut message = format!(
            "Container {} status: {} (CPU: {}%, Memory: {} bytes)",
            container_id,
            self.status,
            fmt(self.cpu),
            fmt(self.mem)
        );
        if let Some(error) = &self.error {
            message.push_str(": ");
            message.push_str(error);
        }
        message
    }
}

/// Control-plane action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Start,
    Restart,
}

impl RecoveryAction {
    /// "restart" when the remedy text mentions it, otherwise "start"
    pub fn for_solution(solution: &str) -> Self {
        if solution.contains("restart") {
            RecoveryAction::Restart
        } else {
            RecoveryAction::Start
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::Start => "start",
            RecoveryAction::Restart => "restart",
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one control-plane call
#[derive(Debug, Clone, PartialEq)]
pub struct ControlOutcome {
    pub success: bool,

    /// Command line or request that was issued
    pub command: String,

    /// Captured output or failure detail
    pub output: String,
}

/// Outcome of one orchestrator visit to a service
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Healthy,
    /// Failure recorded, no cached remedy to try
    Recorded { event_id: Option<i64> },
    /// Failure recorded and a remedy was run
    Attempted {
        event_id: Option<i64>,
        action: RecoveryAction,
        success: bool,
    },
}
