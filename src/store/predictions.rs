//! Prediction tables: anomaly forecasts and trend history

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::info;

use crate::errors::{EngineError, Result};
use crate::store::EventStore;
use crate::types::{EmergenceType, FailurePrediction, PatternEvolutionPrediction};

impl EventStore {
    /// Persist an anomaly forecast and return its id
    pub fn record_prediction(&self, prediction: &FailurePrediction) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO failure_predictions
             (timestamp, service, container_id, predicted_error_type,
              confidence, predicted_time, was_correct)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                prediction.timestamp,
                prediction.service,
                prediction.container_id,
                prediction.predicted_error_type,
                prediction.confidence,
                prediction.predicted_time,
                prediction.was_correct,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent anomaly forecasts, newest first
    pub fn recent_predictions(&self, limit: usize) -> Result<Vec<FailurePrediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, service, container_id, predicted_error_type,
                    confidence, predicted_time, was_correct
             FROM failure_predictions
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(FailurePrediction {
                id: Some(row.get(0)?),
                timestamp: row.get(1)?,
                service: row.get(2)?,
                container_id: row.get(3)?,
                predicted_error_type: row.get(4)?,
                confidence: row.get(5)?,
                predicted_time: row.get(6)?,
                was_correct: row.get(7)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Backfill the correctness flag of every forecast whose window elapsed.
    ///
    /// A forecast is correct when a failure for the same service and
    /// container was recorded after it was emitted and no later than its
    /// predicted time. Returns the number of forecasts resolved.
    pub fn reconcile_predictions(&self, now: f64) -> Result<usize> {
        let resolved = self.conn()?.execute(
            "UPDATE failure_predictions
             SET was_correct = EXISTS (
                 SELECT 1 FROM failure_events e
                 WHERE e.service = failure_predictions.service
                   AND e.container_id = failure_predictions.container_id
                   AND e.timestamp > failure_predictions.timestamp
                   AND e.timestamp <= failure_predictions.predicted_time
             )
             WHERE was_correct IS NULL AND predicted_time <= ?1",
            params![now],
        )?;

        info!(resolved, "Reconciled failure predictions");
        Ok(resolved)
    }

    /// Append one raw trend sample to the pattern history
    pub fn record_pattern_state(&self, pattern_type: &str, state: &serde_json::Value) -> Result<i64> {
        let resources = state.get("neural_resources").cloned().unwrap_or_else(|| serde_json::json!({}));
        let flow = state.get("flow_state").cloned().unwrap_or_else(|| serde_json::json!({}));

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pattern_history (pattern_type, pattern_state, neural_metrics, flow_state, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pattern_type,
                serde_json::to_string(state)?,
                serde_json::to_string(&resources)?,
                serde_json::to_string(&flow)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Number of stored trend samples for a pattern type
    pub fn pattern_history_len(&self, pattern_type: &str) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM pattern_history WHERE pattern_type = ?1",
            params![pattern_type],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    /// Persist a trend forecast and return its id
    pub fn record_evolution(&self, prediction: &PatternEvolutionPrediction) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO pattern_predictions
             (pattern_type, evolution_confidence, evolution_time, emergence_type,
              pattern_signature, neural_state, flow_metrics, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                prediction.pattern_type,
                prediction.evolution_confidence,
                prediction.evolution_time.to_rfc3339(),
                prediction.emergence_type.as_str(),
                prediction.pattern_signature,
                prediction.neural_state,
                prediction.flow_metrics,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent trend forecasts, newest first
    pub fn recent_evolutions(&self, limit: usize) -> Result<Vec<PatternEvolutionPrediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT pattern_type, evolution_confidence, evolution_time, emergence_type,
                    pattern_signature, neural_state, flow_metrics
             FROM pattern_predictions
             ORDER BY id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut predictions = Vec::new();
        for row in rows {
            let (pattern_type, confidence, time, emergence, signature, neural_state, flow_metrics) = row?;

            let evolution_time = DateTime::parse_from_rfc3339(&time)
                .map_err(|e| EngineError::Generic(format!("Bad evolution time '{}': {}", time, e)))?
                .with_timezone(&Utc);
            let emergence_type = EmergenceType::parse(&emergence)
                .ok_or_else(|| EngineError::Generic(format!("Unknown emergence type '{}'", emergence)))?;

            predictions.push(PatternEvolutionPrediction {
                pattern_type,
                evolution_confidence: confidence,
                evolution_time,
                emergence_type,
                pattern_signature: signature,
                neural_state,
                flow_metrics,
            });
        }
        Ok(predictions)
    }
}
