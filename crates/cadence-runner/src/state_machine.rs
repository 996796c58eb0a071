//! Runner phase transitions.
//!
//! Init -> Verifying -> Polling -> Executing -> Waiting -> Polling ...
//! Any running phase may pause or stop; Paused resumes into Polling.

use cadence_core::types::RunnerPhase;

use crate::error::RunnerError;

/// Validate a phase change. Staying in the same phase is always allowed.
///
/// Valid transitions:
/// - Init / Stopped -> Verifying
/// - Verifying -> Polling
/// - Polling -> Executing / Waiting
/// - Executing -> Waiting / Polling
/// - Waiting -> Polling / Executing
/// - Paused -> Polling
/// - any running phase -> Paused / Stopped
/// - Paused -> Stopped
pub fn validate_transition(from: &RunnerPhase, to: &RunnerPhase) -> Result<(), RunnerError> {
    use RunnerPhase::*;

    if from == to {
        return Ok(());
    }
    let valid = matches!(
        (from, to),
        (Init, Verifying)
            | (Stopped { .. }, Verifying)
            | (Verifying, Polling)
            | (Polling, Executing)
            | (Polling, Waiting)
            | (Executing, Waiting)
            | (Executing, Polling)
            | (Waiting, Polling)
            | (Waiting, Executing)
            | (Paused, Polling)
            | (Paused, Stopped { .. })
    ) || (from.is_running() && matches!(to, Paused | Stopped { .. }));

    if valid {
        Ok(())
    } else {
        Err(RunnerError::InvalidTransition(from.clone(), to.clone()))
    }
}
