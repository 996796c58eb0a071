//! Remote action queue and identity verification client.
//!
//! The queue owns scheduling and ordering; this side only asks for the next
//! action, reports terminal outcomes, and confirms which account the host
//! is logged into.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cadence_core::config::QueueConfig;
use cadence_core::error::Result;
use cadence_core::types::{AccountIdentity, ActionId, ActionStatus, ScheduledAction};

use crate::error::ApiError;

/// Reply to a `next-action` poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    #[serde(default)]
    pub has_action: bool,
    #[serde(default)]
    pub action: Option<ScheduledAction>,
    /// Actions still allowed today. Absent means the queue does not enforce
    /// a daily quota.
    #[serde(default)]
    pub remaining_today: Option<i64>,
}

impl NextAction {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_action(action: ScheduledAction, remaining_today: i64) -> Self {
        Self {
            has_action: true,
            action: Some(action),
            remaining_today: Some(remaining_today),
        }
    }

    /// The daily quota is reported and used up.
    pub fn quota_exhausted(&self) -> bool {
        matches!(self.remaining_today, Some(n) if n <= 0)
    }

    /// The action to run, if the reply actually carries one.
    pub fn into_action(self) -> Option<ScheduledAction> {
        if self.has_action {
            self.action
        } else {
            None
        }
    }
}

/// Terminal outcome of one action, as sent to `actions/{id}/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub retry: bool,
}

impl ActionReport {
    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Completed,
            result: Some(result.into()),
            error: None,
            retry: false,
        }
    }

    pub fn failed(error: impl Into<String>, retry: bool) -> Self {
        Self {
            status: ActionStatus::Failed,
            result: None,
            error: Some(error.into()),
            retry,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Completed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub account_info: Option<serde_json::Value>,
}

impl VerifyResponse {
    pub fn is_verified(&self) -> bool {
        self.success && self.verified
    }
}

/// Contract of the remote queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn next_action(&self) -> Result<NextAction>;

    async fn complete_action(&self, id: &ActionId, report: &ActionReport) -> Result<()>;

    async fn verify_account(&self, identity: &AccountIdentity) -> Result<VerifyResponse>;
}

/// Queue client over HTTP with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpQueueClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpQueueClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> std::result::Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    /// Build from config, reading the token from the configured variable.
    pub fn from_config(config: &QueueConfig) -> std::result::Result<Self, ApiError> {
        let token = std::env::var(&config.token_env).ok();
        if token.is_none() {
            debug!(var = %config.token_env, "Queue token variable not set");
        }
        Self::new(
            &config.base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> std::result::Result<String, ApiError> {
        let resp = self.authorized(req).send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_status(status, &headers, &body));
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
    ) -> std::result::Result<T, ApiError> {
        let body = self.send(req).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl QueueClient for HttpQueueClient {
    async fn next_action(&self) -> Result<NextAction> {
        let next: NextAction = self.send_json(self.client.get(self.url("next-action"))).await?;
        debug!(
            has_action = next.has_action,
            remaining_today = ?next.remaining_today,
            "Polled queue"
        );
        Ok(next)
    }

    async fn complete_action(&self, id: &ActionId, report: &ActionReport) -> Result<()> {
        let url = self.url(&format!("actions/{}/complete", id));
        self.send(self.client.post(url).json(report)).await?;
        debug!(action_id = %id, status = %report.status, "Reported action");
        Ok(())
    }

    async fn verify_account(&self, identity: &AccountIdentity) -> Result<VerifyResponse> {
        let req = self.client.post(self.url("verify-account")).json(identity);
        Ok(self.send_json(req).await?)
    }
}
