use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CadenceError, Result};
use crate::types::Locator;

/// Top-level configuration for Cadence.
///
/// Loaded from `~/.cadence/config.toml` by default. Secrets (queue token,
/// platform session) are never stored here; the config only names the
/// environment variables that carry them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CadenceConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CadenceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject settings that would make the runner misbehave rather than
    /// merely run slowly.
    pub fn validate(&self) -> Result<()> {
        if self.runner.min_delay_ms > self.runner.max_delay_ms {
            return Err(CadenceError::Config(format!(
                "runner.min_delay_ms ({}) exceeds runner.max_delay_ms ({})",
                self.runner.min_delay_ms, self.runner.max_delay_ms
            )));
        }
        if self.runner.empty_poll_limit == 0 {
            return Err(CadenceError::Config(
                "runner.empty_poll_limit must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(CadenceError::Config(
                "rate_limit.max_requests must be at least 1".to_string(),
            ));
        }
        if self.executor.locate_attempts == 0 {
            return Err(CadenceError::Config(
                "executor.locate_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the session state database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.cadence/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote action queue endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Base URL; `next-action`, `actions/{id}/complete` and `verify-account`
    /// are resolved against it.
    pub base_url: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api/automation".to_string(),
            token_env: "CADENCE_QUEUE_TOKEN".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Target platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
    /// Prefix joined with a profile's public identifier to build its URL.
    pub profile_base_url: String,
    pub conversations_endpoint: String,
    /// `{conversation_id}` is substituted with the conversation key.
    pub messages_endpoint: String,
    /// Environment variable holding the CSRF token.
    pub csrf_env: String,
    /// Environment variable holding the session cookie header.
    pub cookie_env: String,
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://platform.example.com/api".to_string(),
            profile_base_url: "https://platform.example.com/in/".to_string(),
            conversations_endpoint: "/messaging/conversations".to_string(),
            messages_endpoint: "/messaging/conversations/{conversation_id}/events".to_string(),
            csrf_env: "CADENCE_PLATFORM_CSRF".to_string(),
            cookie_env: "CADENCE_PLATFORM_COOKIE".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Queue runner pacing and failure policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Lower bound of the randomized pause between actions.
    pub min_delay_ms: u64,
    /// Upper bound of the randomized pause between actions.
    pub max_delay_ms: u64,
    /// Fixed cooldown after a queue error or unexpected failure.
    pub fetch_cooldown_ms: u64,
    /// Pause between polls that returned no action.
    pub idle_poll_ms: u64,
    /// Consecutive empty polls before the campaign is considered complete.
    pub empty_poll_limit: u32,
    /// Context switches one action may request before it is failed.
    pub max_context_switches: u32,
    /// Attempts to deliver a completion report before giving up.
    pub report_attempts: u32,
}

impl RunnerConfig {
    pub fn fetch_cooldown(&self) -> Duration {
        Duration::from_millis(self.fetch_cooldown_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 30_000,
            max_delay_ms: 90_000,
            fetch_cooldown_ms: 30_000,
            idle_poll_ms: 15_000,
            empty_poll_limit: 3,
            max_context_switches: 3,
            report_attempts: 3,
        }
    }
}

/// Sliding-window limits for calls to the target platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_ms: u64,
    /// Longest single sleep inside `wait_for_slot`.
    pub max_wait_step_ms: u64,
    /// Retries after a platform 429 before the error is surfaced.
    pub max_backoff_retries: u32,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn max_wait_step(&self) -> Duration {
        Duration::from_millis(self.max_wait_step_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_ms: 60_000,
            max_wait_step_ms: 5_000,
            max_backoff_retries: 3,
        }
    }
}

/// Action executor timing and element location policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Attempts per locator chain before a step fails.
    pub locate_attempts: u32,
    /// Fixed delay between locator attempts.
    pub locate_delay_ms: u64,
    /// Randomized pause between interactive steps.
    pub step_delay_min_ms: u64,
    pub step_delay_max_ms: u64,
    /// Randomized dwell time on a profile during warm-up.
    pub dwell_min_ms: u64,
    pub dwell_max_ms: u64,
    /// Platform limit on invitation note length.
    pub note_max_chars: usize,
    pub locators: LocatorCatalog,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            locate_attempts: 3,
            locate_delay_ms: 1_000,
            step_delay_min_ms: 600,
            step_delay_max_ms: 1_800,
            dwell_min_ms: 3_000,
            dwell_max_ms: 8_000,
            note_max_chars: 300,
            locators: LocatorCatalog::default(),
        }
    }
}

/// Ordered locator chains for every element the executors interact with.
///
/// Defaults are deliberately neutral (test ids, accessible labels, visible
/// text); deployments override them per target layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorCatalog {
    pub profile_marker: Vec<Locator>,
    pub connected_marker: Vec<Locator>,
    pub pending_marker: Vec<Locator>,
    pub following_marker: Vec<Locator>,
    pub more_actions_button: Vec<Locator>,
    pub connect_button: Vec<Locator>,
    pub connect_menu_item: Vec<Locator>,
    pub add_note_button: Vec<Locator>,
    pub note_field: Vec<Locator>,
    pub send_invite_button: Vec<Locator>,
    pub follow_button: Vec<Locator>,
    pub follow_menu_item: Vec<Locator>,
    pub message_button: Vec<Locator>,
    pub message_field: Vec<Locator>,
    pub message_send_button: Vec<Locator>,
    pub contact_info_link: Vec<Locator>,
    pub email_field: Vec<Locator>,
}

fn chain(test_id: &str, label: &str) -> Vec<Locator> {
    vec![
        Locator::TestId(test_id.to_string()),
        Locator::AriaLabel(label.to_string()),
        Locator::Text(label.to_string()),
    ]
}

impl Default for LocatorCatalog {
    fn default() -> Self {
        Self {
            profile_marker: vec![
                Locator::TestId("profile-header".to_string()),
                Locator::Css("main h1".to_string()),
            ],
            connected_marker: vec![Locator::TestId("relationship-connected".to_string())],
            pending_marker: chain("relationship-pending", "Pending"),
            following_marker: chain("relationship-following", "Following"),
            more_actions_button: chain("profile-more-actions", "More"),
            connect_button: chain("connect-button", "Connect"),
            connect_menu_item: chain("menu-connect", "Connect"),
            add_note_button: chain("invite-add-note", "Add a note"),
            note_field: vec![
                Locator::TestId("invite-note".to_string()),
                Locator::Css("textarea[name=message]".to_string()),
            ],
            send_invite_button: chain("invite-send", "Send"),
            follow_button: chain("follow-button", "Follow"),
            follow_menu_item: chain("menu-follow", "Follow"),
            message_button: chain("message-button", "Message"),
            message_field: vec![
                Locator::TestId("compose-body".to_string()),
                Locator::Css("[contenteditable=true]".to_string()),
            ],
            message_send_button: chain("compose-send", "Send"),
            contact_info_link: chain("contact-info", "Contact info"),
            email_field: vec![
                Locator::TestId("contact-email".to_string()),
                Locator::Css("a[href^='mailto:']".to_string()),
            ],
        }
    }
}
