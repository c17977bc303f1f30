//! Trend prediction over a summary file that changes between cycles

use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use failsight::prediction::source::SummaryFileSource;
use failsight::prediction::{TrendPredictor, TrendPredictorConfig, TrendSource};
use failsight::store::EventStore;
use failsight::types::EmergenceType;

fn write_summary(dir: &TempDir, efficiency: f64, connected: bool) -> std::path::PathBuf {
    let path = dir.path().join("summary.json");
    let summary = json!({
        "patterns": {
            "p1": {
                "pattern_type": "inference",
                "neural_health": {"status": "optimal"},
                "flow_state": {"connected": connected, "latency": 5.0},
                "neural_resources": {"efficiency": efficiency}
            },
            "p2": {"neural_health": {"status": "optimal"}}
        }
    });
    std::fs::write(&path, serde_json::to_string(&summary).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_rising_load_becomes_pattern_evolution() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let predictor = TrendPredictor::new(TrendPredictorConfig::default());

    for cycle in 0..10 {
        let path = write_summary(&dir, cycle as f64 * 10.0, true);
        let samples = SummaryFileSource::new(path).read().await.unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(predictor.run_cycle(&store, samples), 1);
    }

    assert_eq!(store.pattern_history_len("inference").unwrap(), 10);

    let latest = store.recent_evolutions(1).unwrap().remove(0);
    assert_eq!(latest.emergence_type, EmergenceType::PatternEvolution);

    let signature: serde_json::Value = serde_json::from_str(&latest.pattern_signature).unwrap();
    let resource = &signature[0];
    assert_eq!(resource["type"], "resource_evolution");
    assert_eq!(resource["direction"], "increasing");
    assert!(resource["confidence"].as_f64().unwrap() > 0.85);
}

#[tokio::test]
async fn test_disconnected_flow_degrades() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(EventStore::open_in_memory().unwrap());
    let predictor = TrendPredictor::new(TrendPredictorConfig::default());

    let path = write_summary(&dir, 1000.0, false);
    let samples = SummaryFileSource::new(path).read().await.unwrap();
    predictor.run_cycle(&store, samples);

    let latest = store.recent_evolutions(1).unwrap().remove(0);
    assert_eq!(latest.emergence_type, EmergenceType::Degradation);
    assert!(latest.evolution_confidence < 0.5);
}
