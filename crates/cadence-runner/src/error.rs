//! Error types for the queue runner.

use cadence_action::ActionError;
use cadence_core::error::CadenceError;
use cadence_core::types::RunnerPhase;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Invalid phase transition: {0} -> {1}")]
    InvalidTransition(RunnerPhase, RunnerPhase),
    #[error("Runner is not paused (phase: {0})")]
    NotPaused(RunnerPhase),
    #[error(transparent)]
    Core(#[from] CadenceError),
    #[error("Host error: {0}")]
    Host(#[from] ActionError),
}
