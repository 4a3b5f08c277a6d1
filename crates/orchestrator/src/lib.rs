pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod resources;
pub mod state_machine;

#[cfg(test)]
mod testing;

pub use config::{MonitorConfig, DEFAULT_BASE_URL};
pub use core::{JobCancellation, JobEmitter, PhaseFailure, PhaseOutcome, PhasePoller};
pub use error::{OrchestratorError, Result};
pub use pipeline::{JobHandle, PipelineOrchestrator};
pub use resources::{JobRegistry, TriggerGuard};
pub use state_machine::{PollerState, PollerStateMachine};
