use thiserror::Error;

/// Top-level error type for the Cadence system.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for CadenceError` so that the `?` operator works
/// across crate boundaries (the binary only ever sees this type).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CadenceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Authentication expired; manual re-authentication required")]
    AuthExpired,

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CadenceError {
    /// Whether retrying the failed operation later can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CadenceError::TransientNetwork(_)
                | CadenceError::RateLimited { .. }
                | CadenceError::ElementNotFound(_)
                | CadenceError::Io(_)
        )
    }
}

impl From<toml::de::Error> for CadenceError {
    fn from(err: toml::de::Error) -> Self {
        CadenceError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CadenceError {
    fn from(err: toml::ser::Error) -> Self {
        CadenceError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(err: serde_json::Error) -> Self {
        CadenceError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;
