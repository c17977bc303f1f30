//! Telemetry for failsight
//!
//! Structured logging setup and the operational status codes attached to
//! log records so downstream tooling can filter on engine health.

use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::config::LoggingConfig;

/// Operational status attached to log records as `status_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Operational,
    Degraded,
    Failed,
    Recovering,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Operational => "OPERATIONAL",
            StatusCode::Degraded => "DEGRADED",
            StatusCode::Failed => "FAILED",
            StatusCode::Recovering => "RECOVERING",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the log filter: `RUST_LOG` wins over the configured level
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: &LoggingConfig) {
    let filter = env_filter(&config.level);

    let result = if config.json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };

    if result.is_err() {
        tracing::debug!("Log subscriber already installed");
    }
}
