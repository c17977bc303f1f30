//! Pattern learning and the solution cache
//!
//! Failure events are folded into per-signature statistics in the store;
//! periodic scans score every signature and promote trusted remedies into
//! an in-memory cache the orchestrator reads from.

pub mod confidence;
pub mod learner;

pub use learner::{AnalysisReport, LearnerConfig, PatternLearner, RecoverySolution};
