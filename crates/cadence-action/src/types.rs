use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

// =============================================================================
// Action kinds
// =============================================================================

/// Action types this build knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    VisitProfile,
    Follow,
    Connect,
    Message,
    WarmupConnect,
    MessageOrConnect,
    ExtractEmail,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::VisitProfile,
        ActionKind::Follow,
        ActionKind::Connect,
        ActionKind::Message,
        ActionKind::WarmupConnect,
        ActionKind::MessageOrConnect,
        ActionKind::ExtractEmail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::VisitProfile => "visit_profile",
            ActionKind::Follow => "follow",
            ActionKind::Connect => "connect",
            ActionKind::Message => "message",
            ActionKind::WarmupConnect => "warmup_connect",
            ActionKind::MessageOrConnect => "message_or_connect",
            ActionKind::ExtractEmail => "extract_email",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ActionError::UnknownType(s.to_string()))
    }
}

// =============================================================================
// Results
// =============================================================================

/// Structured outcome of one executor invocation.
///
/// When `requires_context_switch` is set nothing has been done on the
/// target yet; the caller must move the host to `navigate_to` and invoke
/// the executor again from the new context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub requires_context_switch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigate_to: Option<String>,
    /// For failures: whether the queue should try the action again.
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl ActionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            requires_context_switch: false,
            navigate_to: None,
            retryable: false,
            output: None,
        }
    }

    pub fn failure(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            retryable,
            ..Self::success(String::new())
        }
    }

    pub fn context_switch(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            success: false,
            message: format!("Navigating to {}", url),
            requires_context_switch: true,
            navigate_to: Some(url),
            retryable: true,
            output: None,
        }
    }

    pub fn with_output(mut self, output: serde_json::Value) -> Self {
        self.output = Some(output);
        self
    }
}

// =============================================================================
// Relationship
// =============================================================================

/// What the profile page says about the account's relationship with the
/// target. Connected and pending are exclusive; following is independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub connected: bool,
    pub pending: bool,
    pub following: bool,
}

impl Relationship {
    /// An invitation is pointless: already connected or already invited.
    pub fn invite_settled(&self) -> bool {
        self.connected || self.pending
    }
}
