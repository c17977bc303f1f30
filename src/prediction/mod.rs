//! Failure prediction
//!
//! Two independent predictors:
//! - Anomaly predictor: isolation forest over learned-pattern features,
//!   scoring recent failure snapshots once a minute
//! - Trend predictor: rolling windows of health/flow/resource samples per
//!   pattern type, forecasting how each pattern is about to evolve

pub mod types;
pub mod forest;
pub mod features;
pub mod anomaly;
pub mod trend;
pub mod source;

pub use anomaly::{AnomalyConfig, AnomalyPredictor};
pub use forest::{ForestConfig, IsolationForest};
pub use source::{HostSource, SummaryFileSource, TrendSource};
pub use trend::{TrendPredictor, TrendPredictorConfig};
pub use types::{DetectedPattern, StateAnalysis, TrendSample};
