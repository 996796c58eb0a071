//! Durable queue runner: polls the remote action queue, executes one
//! action at a time and survives execution-context teardown.

pub mod error;
pub mod runner;
pub mod state;
pub mod state_machine;

pub use error::RunnerError;
pub use runner::{
    RunOutcome, Runner, RunnerDeps, RunnerStatus, REASON_AUTH_EXPIRED, REASON_COMPLETED,
    REASON_DAILY_LIMIT, REASON_VERIFY_FAILED,
};
pub use state::{PendingReport, RunnerState, RunnerStats};
