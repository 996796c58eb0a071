//! Message the target if already connected, otherwise invite.
//!
//! Payload: `message` (template used when connected), `note` (optional
//! invitation note template).

use std::sync::Arc;

use async_trait::async_trait;

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::host::Host;
use crate::steps::Steps;
use crate::types::{ActionKind, ActionResult};

pub struct MessageOrConnectExecutor {
    config: Arc<ExecutorConfig>,
}

impl MessageOrConnectExecutor {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ActionExecutor for MessageOrConnectExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::MessageOrConnect
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
        steps.wait_for_profile().await?;

        let rel = steps.relationship().await?;
        if rel.connected {
            let text = action.payload_str("message").ok_or_else(|| {
                ActionError::InvalidPayload("`message` is required when connected".to_string())
            })?;
            return steps.message(rel, &action.target, text).await;
        }
        steps
            .connect(rel, &action.target, action.payload_str("note"))
            .await
    }

    fn describe(&self, action: &ScheduledAction) -> String {
        format!("Message or connect with {}", action.target.profile_url)
    }
}
