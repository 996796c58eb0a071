//! Target platform graph API.
//!
//! Every call returns a [`NormalizedResponse`]. The raw HTTP client does no
//! pacing of its own; production paths wrap it in [`ThrottledPlatform`],
//! which admits calls through the shared [`RateLimiter`] and backs off when
//! the platform itself answers 429.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, COOKIE};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use cadence_core::config::{PlatformConfig, RateLimitConfig};
use cadence_graph::NormalizedResponse;

use crate::error::ApiError;
use crate::rate_limit::RateLimiter;

const CSRF_HEADER: &str = "csrf-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One call against the platform API.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformRequest {
    /// Path relative to the configured base URL.
    pub endpoint: String,
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PlatformRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Get,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Post,
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn request(&self, req: &PlatformRequest) -> Result<NormalizedResponse, ApiError>;
}

#[async_trait]
impl<T: PlatformApi + ?Sized> PlatformApi for Arc<T> {
    async fn request(&self, req: &PlatformRequest) -> Result<NormalizedResponse, ApiError> {
        (**self).request(req).await
    }
}

// =============================================================================
// HTTP client
// =============================================================================

/// Session credentials the host's logged-in browser context holds.
#[derive(Debug, Clone, Default)]
pub struct PlatformAuth {
    pub csrf_token: Option<String>,
    pub cookie: Option<String>,
}

impl PlatformAuth {
    pub fn from_env(config: &PlatformConfig) -> Self {
        let read = |var: &str| std::env::var(var).ok().filter(|v| !v.trim().is_empty());
        Self {
            csrf_token: read(&config.csrf_env),
            cookie: read(&config.cookie_env),
        }
    }

    fn headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.csrf_token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| ApiError::Config(format!("Invalid CSRF token: {}", e)))?;
            headers.insert(HeaderName::from_static(CSRF_HEADER), value);
        }
        if let Some(cookie) = &self.cookie {
            let mut value = HeaderValue::from_str(cookie)
                .map_err(|e| ApiError::Config(format!("Invalid cookie header: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }
        Ok(headers)
    }
}

#[derive(Debug, Clone)]
pub struct HttpPlatformClient {
    client: Client,
    base_url: String,
}

impl HttpPlatformClient {
    pub fn new(base_url: &str, auth: &PlatformAuth, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(auth.headers()?)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &PlatformConfig) -> Result<Self, ApiError> {
        Self::new(
            &config.base_url,
            &PlatformAuth::from_env(config),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn request(&self, req: &PlatformRequest) -> Result<NormalizedResponse, ApiError> {
        let url = self.url(&req.endpoint);
        let mut builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &headers, &text));
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let response = NormalizedResponse::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        debug!(
            endpoint = %req.endpoint,
            elements = response.elements.len(),
            included = response.included.len(),
            "Platform response decoded"
        );
        Ok(response)
    }
}

// =============================================================================
// Throttling decorator
// =============================================================================

/// Wraps a platform client with local admission control and bounded
/// retries on platform-side 429s.
pub struct ThrottledPlatform<P> {
    inner: P,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
    fallback_backoff: Duration,
}

impl<P: PlatformApi> ThrottledPlatform<P> {
    pub fn new(inner: P, limiter: Arc<RateLimiter>, max_retries: u32) -> Self {
        Self {
            inner,
            limiter,
            max_retries,
            fallback_backoff: Duration::from_secs(5),
        }
    }

    pub fn from_config(inner: P, limiter: Arc<RateLimiter>, config: &RateLimitConfig) -> Self {
        Self::new(inner, limiter, config.max_backoff_retries)
            .with_fallback_backoff(config.max_wait_step())
    }

    /// Backoff used when a 429 carries no `Retry-After`; doubled per retry.
    pub fn with_fallback_backoff(mut self, backoff: Duration) -> Self {
        self.fallback_backoff = backoff;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl<P: PlatformApi> PlatformApi for ThrottledPlatform<P> {
    async fn request(&self, req: &PlatformRequest) -> Result<NormalizedResponse, ApiError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.acquire().await;
            match self.inner.request(req).await {
                Err(ApiError::RateLimited { retry_after }) if attempt < self.max_retries => {
                    let wait = retry_after
                        .unwrap_or_else(|| self.fallback_backoff.saturating_mul(1 << attempt.min(16)));
                    warn!(
                        endpoint = %req.endpoint,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "Platform rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
