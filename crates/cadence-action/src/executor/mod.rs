//! Executor trait and registry.
//!
//! Every executor follows the same contract:
//! - check the host is on the target page before touching anything; if
//!   not, return a context-switch result and do nothing else,
//! - short-circuit goals that are already met,
//! - locate elements through bounded locator chains,
//! - report failure as a result, never as a panic.

pub mod connect;
pub mod extract_email;
pub mod follow;
pub mod message;
pub mod message_or_connect;
pub mod visit_profile;
pub mod warmup_connect;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::host::Host;
use crate::types::{ActionKind, ActionResult};

pub use connect::ConnectExecutor;
pub use extract_email::ExtractEmailExecutor;
pub use follow::FollowExecutor;
pub use message::MessageExecutor;
pub use message_or_connect::MessageOrConnectExecutor;
pub use visit_profile::VisitProfileExecutor;
pub use warmup_connect::WarmupConnectExecutor;

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn kind(&self) -> ActionKind;

    async fn execute(
        &self,
        host: &dyn Host,
        action: &ScheduledAction,
    ) -> Result<ActionResult, ActionError>;

    /// Human-readable summary for logs.
    fn describe(&self, action: &ScheduledAction) -> String {
        format!("{} {}", self.kind(), action.target.profile_url)
    }
}

/// Executors keyed by action kind.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<ActionKind, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in executor sharing one config.
    pub fn with_defaults(config: ExecutorConfig) -> Self {
        let config = Arc::new(config);
        let mut registry = Self::new();
        registry.register(Arc::new(VisitProfileExecutor::new(Arc::clone(&config))));
        registry.register(Arc::new(FollowExecutor::new(Arc::clone(&config))));
        registry.register(Arc::new(ConnectExecutor::new(Arc::clone(&config))));
        registry.register(Arc::new(MessageExecutor::new(Arc::clone(&config))));
        registry.register(Arc::new(WarmupConnectExecutor::new(Arc::clone(&config))));
        registry.register(Arc::new(MessageOrConnectExecutor::new(Arc::clone(&config))));
        registry.register(Arc::new(ExtractEmailExecutor::new(config)));
        registry
    }

    /// Register an executor, replacing any previous one of the same kind.
    pub fn register(&mut self, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub fn get(&self, kind: ActionKind) -> Option<&Arc<dyn ActionExecutor>> {
        self.executors.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|k| self.executors.contains_key(k))
            .collect()
    }

    /// Run `action` with its executor. Never fails: unknown types, missing
    /// executors and executor errors all come back as failed results.
    pub async fn dispatch(&self, host: &dyn Host, action: &ScheduledAction) -> ActionResult {
        let kind = match action.action_type.parse::<ActionKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(action_id = %action.id, action_type = %action.action_type, "Unknown action type");
                return ActionResult::failure(e.to_string(), e.is_retryable());
            }
        };
        let Some(executor) = self.get(kind) else {
            warn!(action_id = %action.id, kind = %kind, "No executor registered");
            return ActionResult::failure(format!("No executor registered for {}", kind), false);
        };

        info!(action_id = %action.id, "Executing: {}", executor.describe(action));
        match executor.execute(host, action).await {
            Ok(result) => result,
            Err(e) => {
                warn!(action_id = %action.id, kind = %kind, error = %e, "Executor failed");
                ActionResult::failure(e.to_string(), e.is_retryable())
            }
        }
    }
}
