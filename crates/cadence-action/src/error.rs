//! Error types for action execution.
//!
//! These never reach the runner: the registry turns every error into a
//! failed [`ActionResult`](crate::types::ActionResult) whose `retryable`
//! flag comes from [`ActionError::is_retryable`].

/// Errors raised inside an executor or by the host primitives it drives.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Could not find {what} after {attempts} attempt(s)")]
    ElementNotFound { what: String, attempts: u32 },
    #[error("Host automation failed: {0}")]
    Host(String),
    #[error("Payload validation failed: {0}")]
    InvalidPayload(String),
    #[error("Unknown action type: {0}")]
    UnknownType(String),
}

impl ActionError {
    /// Whether the queue should schedule the action again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::ElementNotFound { .. } | ActionError::Host(_)
        )
    }
}
