//! Configuration management for failsight
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.failsight/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::errors::{EngineError, Result};

/// Complete configuration for failsight
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub learning: LearningConfig,
    pub prediction: PredictionConfig,
    pub trend: TrendConfig,
    pub recovery: RecoveryConfig,
    pub logging: LoggingConfig,
}

/// Durable store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: String,
}

/// Pattern learner knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Idle time on the event queue before a pattern re-scan
    pub idle_timeout_secs: u64,
    /// Success rate a pattern must exceed to be cached
    pub min_success_rate: f64,
    /// Confidence a pattern must exceed to be cached
    pub min_confidence: f64,
    /// Bounded ingestion queue capacity
    pub queue_capacity: usize,
}

/// Anomaly predictor knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub training_interval_secs: u64,
    pub prediction_window_secs: u64,
    pub period_secs: u64,
    /// Events newer than this are scored each cycle
    pub lookback_secs: u64,
    /// Snapshot history averaged into each pattern's training row
    pub training_history_secs: u64,
    pub contamination: f64,
    pub n_trees: usize,
    pub max_samples: usize,
    pub seed: u64,
}

/// Trend evolution predictor knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub pattern_window: usize,
    pub evolution_threshold: f64,
    pub period_secs: u64,
    /// JSON summary of pattern states; host metrics are sampled when unset
    pub summary_path: Option<String>,
}

/// How a monitored service is probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Command,
    Http,
}

/// One monitored (service, container) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredService {
    pub service: String,
    pub container_id: String,
    #[serde(default = "default_probe_kind")]
    pub probe: ProbeKind,
    /// Health URL, required for HTTP probes
    #[serde(default)]
    pub url: Option<String>,
}

fn default_probe_kind() -> ProbeKind {
    ProbeKind::Command
}

/// Recovery orchestrator knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub poll_period_secs: u64,
    /// Upper bound for any probe or control-plane call
    pub request_timeout_secs: u64,
    /// Probe argv; `{id}` is replaced with the container id
    pub probe_command: Vec<String>,
    /// Control-plane argv; `{id}` and `{action}` are replaced
    pub control_command: Vec<String>,
    /// Run the default "start" action when no remedy is cached
    pub attempt_without_solution: bool,
    pub services: Vec<MonitoredService>,
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.failsight/failure_learning.db".to_string(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            min_success_rate: 0.8,
            min_confidence: 0.7,
            queue_capacity: 1024,
        }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            training_interval_secs: 3600,
            prediction_window_secs: 3600,
            period_secs: 60,
            lookback_secs: 3600,
            training_history_secs: 86400,
            contamination: 0.1,
            n_trees: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            pattern_window: 10,
            evolution_threshold: 0.85,
            period_secs: 60,
            summary_path: None,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        let argv = |parts: &[&str]| parts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            poll_period_secs: 10,
            request_timeout_secs: 10,
            probe_command: argv(&[
                "pvesh",
                "get",
                "/nodes/pve/lxc/{id}/status/current",
                "--output-format=json",
            ]),
            control_command: argv(&["pvesh", "create", "/nodes/pve/lxc/{id}/status/{action}"]),
            attempt_without_solution: false,
            services: vec![
                MonitoredService::command("ollama", "200"),
                MonitoredService::command("qdrant", "201"),
                MonitoredService::command("mcp", "203"),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MonitoredService {
    /// Service probed through the probe command
    pub fn command(service: &str, container_id: &str) -> Self {
        Self {
            service: service.to_string(),
            container_id: container_id.to_string(),
            probe: ProbeKind::Command,
            url: None,
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            Self::load_from_file(&config_path)
        } else {
            Self::load_default()
        }
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load default configuration from standard location or use built-in defaults
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// Standard configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".failsight").join("config.toml"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(EngineError::ConfigError(format!("{} must be between 0.0 and 1.0", name)))
            }
        };

        unit("min_success_rate", self.learning.min_success_rate)?;
        unit("min_confidence", self.learning.min_confidence)?;
        unit("evolution_threshold", self.trend.evolution_threshold)?;

        if self.prediction.contamination <= 0.0 || self.prediction.contamination > 0.5 {
            return Err(EngineError::ConfigError(
                "contamination must be in (0.0, 0.5]".to_string()
            ));
        }

        if self.trend.pattern_window < 2 {
            return Err(EngineError::ConfigError(
                "pattern_window must be at least 2".to_string()
            ));
        }

        if self.learning.queue_capacity == 0 {
            return Err(EngineError::ConfigError(
                "queue_capacity must be greater than 0".to_string()
            ));
        }

        if self.prediction.n_trees == 0 || self.prediction.max_samples == 0 {
            return Err(EngineError::ConfigError(
                "n_trees and max_samples must be greater than 0".to_string()
            ));
        }

        let periods = [
            ("idle_timeout_secs", self.learning.idle_timeout_secs),
            ("training_interval_secs", self.prediction.training_interval_secs),
            ("prediction period_secs", self.prediction.period_secs),
            ("trend period_secs", self.trend.period_secs),
            ("poll_period_secs", self.recovery.poll_period_secs),
            ("request_timeout_secs", self.recovery.request_timeout_secs),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(EngineError::ConfigError(format!("{} must be greater than 0", name)));
            }
        }

        if self.recovery.probe_command.is_empty() || self.recovery.control_command.is_empty() {
            return Err(EngineError::ConfigError(
                "probe_command and control_command must not be empty".to_string()
            ));
        }

        for service in &self.recovery.services {
            if service.probe == ProbeKind::Http && service.url.is_none() {
                return Err(EngineError::ConfigError(
                    format!("Service '{}' uses an HTTP probe but has no url", service.service)
                ));
            }
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(EngineError::ConfigError(
                format!("Invalid log level: {}", self.logging.level)
            )),
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EngineError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| EngineError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Store file path
    pub fn db_path(&self) -> PathBuf {
        Self::expand_path(&self.store.db_path)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.learning.idle_timeout_secs)
    }

    pub fn training_interval(&self) -> Duration {
        Duration::from_secs(self.prediction.training_interval_secs)
    }

    pub fn prediction_period(&self) -> Duration {
        Duration::from_secs(self.prediction.period_secs)
    }

    pub fn trend_period(&self) -> Duration {
        Duration::from_secs(self.trend.period_secs)
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.recovery.poll_period_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.learning.idle_timeout_secs, 60);
        assert_eq!(config.prediction.training_interval_secs, 3600);
        assert_eq!(config.prediction.prediction_window_secs, 3600);
        assert_eq!(config.prediction.period_secs, 60);
        assert_eq!(config.trend.pattern_window, 10);
        assert_eq!(config.trend.evolution_threshold, 0.85);
        assert_eq!(config.learning.min_success_rate, 0.8);
        assert_eq!(config.learning.min_confidence, 0.7);
        assert_eq!(config.recovery.poll_period_secs, 10);
        assert_eq!(config.recovery.services.len(), 3);
    }

    #[test]
    fn test_config_validation_success() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_threshold_range() {
        let mut config = Config::default();
        config.learning.min_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_contamination() {
        let mut config = Config::default();
        config.prediction.contamination = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_http_probe_requires_url() {
        let mut config = Config::default();
        config.recovery.services.push(MonitoredService {
            service: "api".to_string(),
            container_id: "300".to_string(),
            probe: ProbeKind::Http,
            url: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [trend]
            pattern_window = 5

            [[recovery.services]]
            service = "ollama"
            container_id = "200"
            "#,
        )
        .unwrap();

        assert_eq!(config.trend.pattern_window, 5);
        assert_eq!(config.trend.evolution_threshold, 0.85);
        assert_eq!(config.recovery.services.len(), 1);
        assert_eq!(config.recovery.services[0].probe, ProbeKind::Command);
        assert_eq!(config.recovery.poll_period_secs, 10);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let mut config = Config::default();
        config.store.db_path = "/tmp/failsight.db".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(Some(path)).unwrap();
        assert_eq!(loaded.store.db_path, "/tmp/failsight.db");
        assert_eq!(loaded.db_path(), PathBuf::from("/tmp/failsight.db"));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = Config::expand_path("~/.failsight");
        assert!(!expanded.to_string_lossy().contains('~'));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = "/absolute/path";
        assert_eq!(Config::expand_path(path).to_string_lossy(), path);
    }
}
