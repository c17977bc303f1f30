//! Health probes

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::errors::Result;
use crate::recovery::command;
use crate::recovery::types::{ProbeState, ServiceStatus};

/// Reports whether a container or unit is running.
///
/// Probes never fail: any error degrades to an `error` status so the
/// orchestrator treats the service as unhealthy.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, container_id: &str) -> ServiceStatus;
}

/// Runs an argv template and parses its JSON `status`, `cpu` and `mem`
pub struct CommandProbe {
    template: Vec<String>,
    timeout: Duration,
}

impl CommandProbe {
    pub fn new(template: Vec<String>, timeout: Duration) -> Self {
        Self { template, timeout }
    }

    /// Status from the probe command's JSON output
    pub fn parse_status(stdout: &str) -> ServiceStatus {
        let data: Value = match serde_json::from_str(stdout) {
            Ok(data) => data,
            Err(e) => return ServiceStatus::error(format!("invalid probe output: {}", e)),
        };

        let status = data.get("status").and_then(Value::as_str).unwrap_or("unknown");
        ServiceStatus {
            state: ProbeState::from_status(status),
            status: status.to_string(),
            cpu: data.get("cpu").and_then(Value::as_f64),
            mem: data.get("mem").and_then(Value::as_f64),
            error: None,
        }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    async fn probe(&self, container_id: &str) -> ServiceStatus {
        let argv = command::render(&self.template, container_id, None);

        match command::run(&argv, self.timeout).await {
            Ok(output) if output.success() => {
                let status = Self::parse_status(&output.stdout);
                debug!(container_id, status = %status.status, "Container status probed");
                status
            }
            Ok(output) => ServiceStatus::error(output.combined().trim().to_string()),
            Err(e) => ServiceStatus::error(e.to_string()),
        }
    }
}

/// GETs a health URL; any 2xx response means running
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    /// Build a probe whose every request is bounded by `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, _container_id: &str) -> ServiceStatus {
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => ServiceStatus::running(),
            Ok(response) => ServiceStatus::stopped(format!("http {}", response.status().as_u16())),
            Err(e) => ServiceStatus::error(e.to_string()),
        }
    }
}
