//! Feature vectors and confidence scoring for learned patterns

use crate::types::LearnedPattern;

/// Weights for [success_rate, total, success_count, fail_count, recency]
pub const CONFIDENCE_WEIGHTS: [f64; 5] = [0.4, 0.2, 0.2, 0.1, 0.1];

/// Share of the predicted success rate taken from history
const HISTORY_WEIGHT: f64 = 0.7;

/// Success probability reported when nothing is known
const DEFAULT_SUCCESS_PROBABILITY: f64 = 0.5;

/// Confidence features of a pattern, `None` if it was never seen.
///
/// Recency decays with the age of the last occurrence in hours.
pub fn confidence_features(pattern: &LearnedPattern, now: f64) -> Option<[f64; 5]> {
    let success_rate = pattern.success_rate()?;
    let age_hours = (now - pattern.last_seen).max(0.0) / 3600.0;

    Some([
        success_rate,
        pattern.total() as f64,
        pattern.success_count as f64,
        pattern.fail_count as f64,
        1.0 / (1.0 + age_hours),
    ])
}

/// Feature vector used to train the anomaly model
pub fn anomaly_features(pattern: &LearnedPattern, now: f64) -> Option<Vec<f64>> {
    let success_rate = pattern.success_rate()?;
    Some(vec![
        success_rate,
        pattern.total() as f64,
        pattern.success_count as f64,
        pattern.fail_count as f64,
        (now - pattern.last_seen).max(0.0),
    ])
}

/// Score a batch of feature vectors.
///
/// Every column is divided by its maximum over the batch, then the row is
/// dotted with [`CONFIDENCE_WEIGHTS`]. Rows that normalize to all zeros have
/// no defined confidence.
pub fn score_confidences(rows: &[[f64; 5]]) -> Vec<Option<f64>> {
    let mut maxima = [0.0_f64; 5];
    for row in rows {
        for (max, value) in maxima.iter_mut().zip(row.iter()) {
            *max = max.max(*value);
        }
    }

    rows.iter()
        .map(|row| {
            let normalized: Vec<f64> = row
                .iter()
                .zip(maxima.iter())
                .map(|(value, max)| if *max > 0.0 { value / max } else { 0.0 })
                .collect();

            if normalized.iter().all(|v| *v == 0.0) {
                return None;
            }

            Some(
                normalized
                    .iter()
                    .zip(CONFIDENCE_WEIGHTS.iter())
                    .map(|(v, w)| v * w)
                    .sum(),
            )
        })
        .collect()
}

/// Blend historical success rate with the stored confidence
pub fn predicted_success_probability(pattern: &LearnedPattern) -> f64 {
    match (pattern.success_rate(), pattern.confidence) {
        (Some(rate), Some(confidence)) => {
            rate * HISTORY_WEIGHT + confidence * (1.0 - HISTORY_WEIGHT)
        }
        _ => DEFAULT_SUCCESS_PROBABILITY,
    }
}
