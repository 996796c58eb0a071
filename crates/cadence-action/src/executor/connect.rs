//! Send a connection invitation, optionally with a personalized note.
//!
//! Payload: `note` (optional template, `{first_name}` / `{name}`).

use std::sync::Arc;

use async_trait::async_trait;

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::host::Host;
use crate::steps::Steps;
use crate::types::{ActionKind, ActionResult};

pub struct ConnectExecutor {
    config: Arc<ExecutorConfig>,
}

impl ConnectExecutor {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ActionExecutor for ConnectExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Connect
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
        steps
            .connect(rel, &action.target, action.payload_str("note"))
            .await
    }

    fn describe(&self, action: &ScheduledAction) -> String {
        format!("Connect with {}", action.target.profile_url)
    }
}
