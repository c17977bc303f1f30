//! failsight - adaptive failure learning and prediction engine
//!
//! Records service failures and their recovery outcomes, learns which
//! remedies work for which failure signatures, forecasts failures before
//! they happen and automatically applies proven remedies.
//!
//! # Architecture
//!
//! - **store**: durable SQLite log of events, patterns and predictions
//! - **learning**: pattern statistics, confidence scoring, solution cache
//! - **prediction**: isolation-forest anomaly predictor and trend evolution predictor
//! - **recovery**: health probes, control plane, recovery orchestrator
//! - **engine**: component wiring and the four background loops

pub mod errors;
pub mod types;
pub mod store;
pub mod learning;
pub mod prediction;
pub mod recovery;
pub mod engine;

// Re-export commonly used types
pub use errors::{EngineError, Result};
pub use engine::FailureEngine;

pub mod telemetry;
pub mod cli;
