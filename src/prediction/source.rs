//! Where trend samples come from

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use sysinfo::System;
use tracing::warn;

use crate::errors::{EngineError, Result};
use crate::prediction::types::{FlowState, HealthState, ResourceState, TrendSample, OPTIMAL};

/// Pattern type reported by [`HostSource`]
pub const HOST_PATTERN: &str = "host";

/// Memory utilisation above which the host is no longer optimal
const HOST_MEMORY_LIMIT: f64 = 90.0;

/// A producer of trend samples, read once per trend cycle.
///
/// Each sample is paired with the raw JSON it was read from so the history
/// table keeps the original payload.
#[async_trait]
pub trait TrendSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    async fn read(&self) -> Result<Vec<(TrendSample, Value)>>;
}

/// JSON summary file: `{"patterns": {"<id>": {"pattern_type": ..., ...}}}`
pub struct SummaryFileSource {
    path: PathBuf,
}

impl SummaryFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Samples from an already-parsed summary document
    pub fn parse_summary(summary: &Value) -> Vec<(TrendSample, Value)> {
        let Some(patterns) = summary.get("patterns").and_then(Value::as_object) else {
            return Vec::new();
        };

        patterns
            .iter()
            .filter_map(|(id, raw)| {
                let has_type = raw
                    .get("pattern_type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| !t.is_empty());
                if !has_type {
                    return None;
                }

                match serde_json::from_value::<TrendSample>(raw.clone()) {
                    Ok(sample) => Some((sample, raw.clone())),
                    Err(e) => {
                        warn!(pattern_id = %id, error = %e, "Skipping malformed pattern entry");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl TrendSource for SummaryFileSource {
    fn name(&self) -> &str {
        "summary_file"
    }

    async fn read(&self) -> Result<Vec<(TrendSample, Value)>> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let summary: Value = serde_json::from_str(&contents)?;
        Ok(Self::parse_summary(&summary))
    }
}

/// Single `host` sample derived from local memory and load
#[derive(Debug, Default)]
pub struct HostSource;

impl HostSource {
    pub fn new() -> Self {
        Self
    }

    /// Build the host sample from raw figures
    pub fn sample(memory_used_pct: f64, load_one: f64, cpus: usize) -> TrendSample {
        let overloaded = load_one > cpus.max(1) as f64;
        let status = if memory_used_pct < HOST_MEMORY_LIMIT && !overloaded {
            OPTIMAL
        } else {
            "degraded"
        };

        TrendSample {
            pattern_type: HOST_PATTERN.to_string(),
            neural_health: HealthState {
                status: status.to_string(),
            },
            flow_state: FlowState {
                connected: true,
                latency: 0.0,
            },
            neural_resources: ResourceState {
                efficiency: memory_used_pct,
            },
        }
    }
}

#[async_trait]
impl TrendSource for HostSource {
    fn name(&self) -> &str {
        HOST_PATTERN
    }

    async fn read(&self) -> Result<Vec<(TrendSample, Value)>> {
        let (memory_used_pct, load_one, cpus) = tokio::task::spawn_blocking(|| {
            let mut sys = System::new_all();
            sys.refresh_memory();

            let total = sys.total_memory();
            let used_pct = if total > 0 {
                sys.used_memory() as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            (used_pct, System::load_average().one, sys.cpus().len())
        })
        .await
        .map_err(|e| EngineError::Generic(format!("host sampling task failed: {}", e)))?;

        let sample = Self::sample(memory_used_pct, load_one, cpus);
        let mut raw = serde_json::to_value(&sample)?;
        raw["load_avg"] = json!(load_one);
        Ok(vec![(sample, raw)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_entries_without_type_are_skipped() {
        let summary = json!({
            "patterns": {
                "a": {"pattern_type": "inference", "neural_health": {"status": "optimal"},
                      "flow_state": {"connected": true, "latency": 12.0},
                      "neural_resources": {"efficiency": 40.0}},
                "b": {"neural_health": {"status": "optimal"}},
                "c": {"pattern_type": ""}
            }
        });

        let samples = SummaryFileSource::parse_summary(&summary);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].0.pattern_type, "inference");
        assert_eq!(samples[0].0.flow_state.latency, 12.0);
        assert_eq!(samples[0].1["neural_resources"]["efficiency"], 40.0);
    }

    #[test]
    fn test_summary_without_patterns() {
        assert!(SummaryFileSource::parse_summary(&json!({"other": 1})).is_empty());
    }

    #[tokio::test]
    async fn test_summary_file_source_reads_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"patterns": {{"x": {{"pattern_type": "storage", "flow_state": {{"connected": false}}}}}}}}"#
        )
        .unwrap();

        let source = SummaryFileSource::new(file.path());
        let samples = source.read().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert!(!samples[0].0.flow_state.connected);
    }

    #[tokio::test]
    async fn test_missing_summary_file_is_an_error() {
        let source = SummaryFileSource::new("/nonexistent/summary.json");
        assert!(source.read().await.is_err());
    }

    #[test]
    fn test_host_sample_health() {
        assert!(HostSource::sample(40.0, 0.5, 4).is_optimal());
        assert!(!HostSource::sample(95.0, 0.5, 4).is_optimal());
        assert!(!HostSource::sample(40.0, 8.0, 4).is_optimal());
        assert_eq!(HostSource::sample(40.0, 0.5, 4).neural_resources.efficiency, 40.0);
    }

    #[tokio::test]
    async fn test_host_source_reads_one_sample() {
        let samples = HostSource::new().read().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].0.pattern_type, HOST_PATTERN);
    }
}
