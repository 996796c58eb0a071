//! HTTP client error type and status-code mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;

use cadence_core::error::CadenceError;

/// Longest response body kept in an error message.
const MAX_BODY_IN_ERROR: usize = 200;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("Authentication rejected (HTTP {status})")]
    AuthExpired { status: u16 },

    #[error("Rate limited by remote (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Classify a non-success response.
    pub fn from_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::AuthExpired {
                status: status.as_u16(),
            },
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
                retry_after: retry_after(headers),
            },
            s if s.is_server_error() => {
                ApiError::Transient(format!("HTTP {}: {}", s.as_u16(), clip(body)))
            }
            s => ApiError::Http {
                status: s.as_u16(),
                body: clip(body),
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient(_) | ApiError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            ApiError::Config(err.to_string())
        } else {
            ApiError::Transient(err.to_string())
        }
    }
}

impl From<ApiError> for CadenceError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Transient(msg) => CadenceError::TransientNetwork(msg),
            ApiError::AuthExpired { .. } => CadenceError::AuthExpired,
            ApiError::RateLimited { retry_after } => CadenceError::RateLimited {
                retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            },
            ApiError::InvalidResponse(msg) => CadenceError::InvalidResponse(msg),
            ApiError::Config(msg) => CadenceError::Config(msg),
            other @ ApiError::Http { .. } => CadenceError::InvalidResponse(other.to_string()),
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn clip(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_auth_statuses() {
        let h = HeaderMap::new();
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, &h, ""),
            ApiError::AuthExpired { status: 401 }
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::FORBIDDEN, &h, ""),
            ApiError::AuthExpired { status: 403 }
        ));
    }

    #[test]
    fn test_rate_limit_reads_retry_after() {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        match ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, &h, "") {
            ApiError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("unexpected: {:?}", other),
        }

        h.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert!(matches!(
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, &h, ""),
            ApiError::RateLimited { retry_after: None }
        ));
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = ApiError::from_status(StatusCode::BAD_GATEWAY, &HeaderMap::new(), "upstream");
        assert!(err.is_retryable());
        assert!(matches!(
            CadenceError::from(err),
            CadenceError::TransientNetwork(_)
        ));
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let long = "x".repeat(500);
        let err = ApiError::from_status(StatusCode::NOT_FOUND, &HeaderMap::new(), &long);
        assert!(!err.is_retryable());
        match &err {
            ApiError::Http { status, body } => {
                assert_eq!(*status, 404);
                assert!(body.chars().count() <= MAX_BODY_IN_ERROR + 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            CadenceError::from(err),
            CadenceError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_conversion_keeps_rate_limit_hint() {
        let err = ApiError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        };
        match CadenceError::from(err) {
            CadenceError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, Some(2000)),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            CadenceError::from(ApiError::AuthExpired { status: 401 }),
            CadenceError::AuthExpired
        ));
    }
}
