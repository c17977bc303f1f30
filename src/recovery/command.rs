//! argv templates and bounded process execution
//!
//! Commands run without a shell; placeholders are substituted per argument
//! so container ids can never inject extra arguments.

use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::{EngineError, Result};

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout, with stderr appended when present
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else if self.stdout.trim().is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Substitute `{id}` and `{action}` in every argument
pub fn render(template: &[String], id: &str, action: Option<&str>) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let arg = arg.replace("{id}", id);
            match action {
                Some(action) => arg.replace("{action}", action),
                None => arg,
            }
        })
        .collect()
}

/// Run `argv` to completion within `limit`
pub async fn run(argv: &[String], limit: Duration) -> Result<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| EngineError::Collaborator("command cannot be empty".to_string()))?;

    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);

    match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }),
        Ok(Err(e)) => Err(EngineError::Collaborator(format!("failed to execute {}: {}", program, e))),
        Err(_) => Err(EngineError::Timeout {
            duration_ms: limit.as_millis() as u64,
        }),
    }
}
