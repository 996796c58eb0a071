//! Send a direct message to a first-degree connection.
//!
//! Payload: `message` (required template).

use std::sync::Arc;

use async_trait::async_trait;

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::host::Host;
use crate::steps::Steps;
use crate::types::{ActionKind, ActionResult};

pub struct MessageExecutor {
    config: Arc<ExecutorConfig>,
}

impl MessageExecutor {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ActionExecutor for MessageExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Message
    }

    async fn execute(
        &self,
        host: &dyn Host,
        action: &ScheduledAction,
    ) -> Result<ActionResult, ActionError> {
        let steps = Steps::new(host, &self.config);
        if let Some(switch) = steps.ensure_at(&action.target.profile_url).await? {
            return Ok(switch);
        }
        let text = action
            .payload_str("message")
            .ok_or_else(|| ActionError::InvalidPayload("`message` is required".to_string()))?;
        steps.wait_for_profile().await?;
        let rel = steps.relationship().await?;
        steps.message(rel, &action.target, text).await
    }

    fn describe(&self, action: &ScheduledAction) -> String {
        format!("Message {}", action.target.profile_url)
    }
}
