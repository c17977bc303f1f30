//! System-state snapshots and the numeric features read back from them

use serde_json::{json, Value};
use sysinfo::{Disks, System};

use crate::errors::{EngineError, Result};
use crate::types::now_secs;

const MIB: u64 = 1024 * 1024;

/// Capture a snapshot of the local host for attaching to a failure event.
///
/// Keys: `timestamp`, `memory_usage` (MB used), `memory_total` (MB),
/// `load_avg` ([1, 5, 15] minute averages) and `disk_usage` (one entry per
/// mounted disk).
pub fn capture_system_state() -> Value {
    let mut sys = System::new_all();
    sys.refresh_memory();

    let load = System::load_average();
    let disks = Disks::new_with_refreshed_list();

    let disk_usage: Vec<Value> = disks
        .iter()
        .map(|disk| {
            json!({
                "mount_point": disk.mount_point().display().to_string(),
                "total_mb": disk.total_space() / MIB,
                "available_mb": disk.available_space() / MIB,
            })
        })
        .collect();

    json!({
        "timestamp": now_secs(),
        "memory_usage": sys.used_memory() / MIB,
        "memory_total": sys.total_memory() / MIB,
        "load_avg": [load.one, load.five, load.fifteen],
        "disk_usage": disk_usage,
    })
}

/// `[memory_usage_mb, load_avg_1m]` from a stored snapshot.
///
/// Memory is required and may be a number, a numeric string or the text
/// output of `free -m` (second line, third column). A missing load average
/// reads as zero.
pub fn extract_snapshot_features(state: &Value) -> Result<[f64; 2]> {
    let memory = match state.get("memory_usage") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_memory_text(s),
        _ => None,
    }
    .ok_or_else(|| EngineError::FeatureExtraction("snapshot has no usable memory_usage".to_string()))?;

    let load = match state.get("load_avg") {
        None | Some(Value::Null) => 0.0,
        Some(Value::Array(values)) => match values.first() {
            None => 0.0,
            Some(first) => as_number(first)
                .ok_or_else(|| EngineError::FeatureExtraction("load_avg is not numeric".to_string()))?,
        },
        Some(other) => as_number(other)
            .ok_or_else(|| EngineError::FeatureExtraction("load_avg is not numeric".to_string()))?,
    };

    if !memory.is_finite() || !load.is_finite() {
        return Err(EngineError::FeatureExtraction("snapshot value is not finite".to_string()));
    }

    Ok([memory, load])
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_memory_text(text: &str) -> Option<f64> {
    if let Ok(value) = text.trim().parse::<f64>() {
        return Some(value);
    }
    text.lines().nth(1)?.split_whitespace().nth(2)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREE_OUTPUT: &str = "              total        used        free      shared  buff/cache   available\n\
Mem:          15896        6012        1834         412        8049        9120\n\
Swap:          2047           0        2047\n";

    #[test]
    fn test_numeric_snapshot() {
        let state = json!({"memory_usage": 2048, "load_avg": [1.5, 1.0, 0.5]});
        assert_eq!(extract_snapshot_features(&state).unwrap(), [2048.0, 1.5]);
    }

    #[test]
    fn test_free_text_snapshot() {
        let state = json!({"memory_usage": FREE_OUTPUT, "load_avg": [0.25]});
        assert_eq!(extract_snapshot_features(&state).unwrap(), [6012.0, 0.25]);
    }

    #[test]
    fn test_non_finite_values_rejected() {
        for state in [
            json!({"memory_usage": "inf"}),
            json!({"memory_usage": "1e999"}),
            json!({"memory_usage": "NaN"}),
            json!({"memory_usage": 512, "load_avg": ["-inf"]}),
        ] {
            assert!(matches!(
                extract_snapshot_features(&state),
                Err(EngineError::FeatureExtraction(_))
            ));
        }
    }

    #[test]
    fn test_missing_load_defaults_to_zero() {
        let state = json!({"memory_usage": "512"});
        assert_eq!(extract_snapshot_features(&state).unwrap(), [512.0, 0.0]);
    }

    #[test]
    fn test_missing_memory_is_an_error() {
        let err = extract_snapshot_features(&json!({"load_avg": [1.0]})).unwrap_err();
        assert!(matches!(err, EngineError::FeatureExtraction(_)));
    }

    #[test]
    fn test_garbled_memory_text_is_an_error() {
        assert!(extract_snapshot_features(&json!({"memory_usage": "Mem: n/a"})).is_err());
    }

    #[test]
    fn test_captured_state_is_extractable() {
        let state = capture_system_state();
        let [memory, load] = extract_snapshot_features(&state).unwrap();
        assert!(memory >= 0.0);
        assert!(load >= 0.0);
        assert!(state["timestamp"].as_f64().unwrap() > 0.0);
    }
}
