use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle status of a scheduled action, as owned by the remote queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Executing => write!(f, "executing"),
            ActionStatus::Completed => write!(f, "completed"),
            ActionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "executing" => Ok(ActionStatus::Executing),
            "completed" => Ok(ActionStatus::Completed),
            "failed" => Ok(ActionStatus::Failed),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

/// Phase of the queue runner state machine.
///
/// `Verifying`, `Polling`, `Executing` and `Waiting` are the running phases;
/// a persisted snapshot in one of them means a loop was live when the
/// execution context went away.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerPhase {
    #[default]
    Init,
    Verifying,
    Polling,
    Executing,
    Waiting,
    Paused,
    Stopped {
        reason: String,
    },
}

impl RunnerPhase {
    pub fn stopped(reason: impl Into<String>) -> Self {
        RunnerPhase::Stopped {
            reason: reason.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            RunnerPhase::Verifying
                | RunnerPhase::Polling
                | RunnerPhase::Executing
                | RunnerPhase::Waiting
        )
    }
}

impl fmt::Display for RunnerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerPhase::Init => write!(f, "init"),
            RunnerPhase::Verifying => write!(f, "verifying"),
            RunnerPhase::Polling => write!(f, "polling"),
            RunnerPhase::Executing => write!(f, "executing"),
            RunnerPhase::Waiting => write!(f, "waiting"),
            RunnerPhase::Paused => write!(f, "paused"),
            RunnerPhase::Stopped { reason } => write!(f, "stopped({})", reason),
        }
    }
}

/// Strategy used to find an interactive element on the host's current page.
///
/// Locators are plain data so that fallback chains can be configured and
/// evaluated in order instead of being encoded as branching code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    TestId(String),
    AriaLabel(String),
    Text(String),
    XPath(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(v) => write!(f, "css={}", v),
            Locator::TestId(v) => write!(f, "test-id={}", v),
            Locator::AriaLabel(v) => write!(f, "aria-label={}", v),
            Locator::Text(v) => write!(f, "text={}", v),
            Locator::XPath(v) => write!(f, "xpath={}", v),
        }
    }
}

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Identifier assigned to an action by the remote queue.
///
/// The queue may emit ids as JSON numbers or strings; both deserialize to
/// the same textual form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ActionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => ActionId(s),
            RawId::Number(n) => ActionId(n.to_string()),
        })
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// Reference to the prospect/contact an action targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProspectRef {
    #[serde(default)]
    pub id: Option<String>,
    pub profile_url: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl ProspectRef {
    /// First whitespace-separated token of the display name, if any.
    pub fn first_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
    }
}

/// A unit of work handed out by the remote queue.
///
/// `action_type` is kept as the raw wire string so that actions of a type
/// this build does not know can still be deserialized, executed as a
/// permanent failure, and reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub id: ActionId,
    pub action_type: String,
    pub target: ProspectRef,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ActionStatus,
    #[serde(default)]
    pub retry_count: u32,
}

impl ScheduledAction {
    /// String parameter from the free-form payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    /// Boolean parameter from the free-form payload, with a default.
    pub fn payload_bool(&self, key: &str, default: bool) -> bool {
        self.payload
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

/// Identity of the account the host is logged in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub profile_url: String,
    #[serde(default)]
    pub name: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
