//! Recovery orchestration
//!
//! Health probes, the control plane used to start or restart containers and
//! the orchestrator loop that ties them to the learned solution cache.

pub mod types;
pub mod command;
pub mod probe;
pub mod control;
pub mod orchestrator;

pub use control::{CommandControlPlane, ControlPlane};
pub use orchestrator::{MonitoredTarget, RecoveryOrchestrator};
pub use probe::{CommandProbe, HealthProbe, HttpProbe};
pub use types::{ControlOutcome, PollOutcome, ProbeState, RecoveryAction, ServiceStatus, CONTAINER_INACTIVE};
