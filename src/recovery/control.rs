//! Control plane: start or restart a container

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::recovery::command;
use crate::recovery::types::{ControlOutcome, RecoveryAction};

/// Executes recovery actions, awaited to completion
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Failures, including timeouts, come back as an unsuccessful outcome
    async fn execute(&self, container_id: &str, action: RecoveryAction) -> ControlOutcome;
}

/// Runs an argv template with `{id}` and `{action}` substituted
pub struct CommandControlPlane {
    template: Vec<String>,
    timeout: Duration,
}

impl CommandControlPlane {
    pub fn new(template: Vec<String>, timeout: Duration) -> Self {
        Self { template, timeout }
    }
}

#[async_trait]
impl ControlPlane for CommandControlPlane {
    async fn execute(&self, container_id: &str, action: RecoveryAction) -> ControlOutcome {
        let argv = command::render(&self.template, container_id, Some(action.as_str()));
        let command_line = argv.join(" ");
        debug!(container_id, action = %action, command = %command_line, "Running control command");

        match command::run(&argv, self.timeout).await {
            Ok(output) => ControlOutcome {
                success: output.success(),
                command: command_line,
                output: output.combined(),
            },
            Err(e) => ControlOutcome {
                success: false,
                command: command_line,
                output: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_action() {
        let template = vec!["echo".to_string(), "{action}".to_string(), "{id}".to_string()];
        let control = CommandControlPlane::new(template, Duration::from_secs(5));

        let outcome = control.execute("200", RecoveryAction::Restart).await;
        assert!(outcome.success);
        assert_eq!(outcome.command, "echo restart 200");
        assert_eq!(outcome.output.trim(), "restart 200");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_action() {
        let template = vec!["false".to_string()];
        let control = CommandControlPlane::new(template, Duration::from_secs(5));
        assert!(!control.execute("200", RecoveryAction::Start).await.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let template = vec!["sleep".to_string(), "5".to_string()];
        let control = CommandControlPlane::new(template, Duration::from_millis(100));

        let outcome = control.execute("200", RecoveryAction::Start).await;
        assert!(!outcome.success);
        assert!(outcome.output.contains("timed out") || outcome.output.contains("Timeout"));
    }
}
