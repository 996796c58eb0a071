//! Read the target's email address from their contact info, if shared.
//!
//! A profile without contact info or without an email is a successful
//! extraction with a null `email`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::host::Host;
use crate::steps::Steps;
use crate::template;
use crate::types::{ActionKind, ActionResult};

pub struct ExtractEmailExecutor {
    config: Arc<ExecutorConfig>,
}

impl ExtractEmailExecutor {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        Self { config }
    }

    fn not_present(reason: &str) -> ActionResult {
        ActionResult::success(reason).with_output(json!({ "email": Value::Null }))
    }
}

#[async_trait]
impl ActionExecutor for ExtractEmailExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::ExtractEmail
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

        let locators = &self.config.locators;
        let Some(link) = steps.probe(&locators.contact_info_link).await? else {
            return Ok(Self::not_present("No contact info on profile"));
        };
        host.click(&link).await?;
        steps.pause().await;

        let field = match steps.find(&locators.email_field, "email field").await {
            Ok(field) => field,
            Err(ActionError::ElementNotFound { .. }) => {
                return Ok(Self::not_present("No email shared"));
            }
            Err(e) => return Err(e),
        };
        let text = host.read_text(&field).await?.unwrap_or_default();
        match template::extract_email(&text) {
            Some(email) => {
                debug!(action_id = %action.id, "Email extracted");
                Ok(ActionResult::success("Email extracted").with_output(json!({ "email": email })))
            }
            None => Ok(Self::not_present("No email shared")),
        }
    }

    fn describe(&self, action: &ScheduledAction) -> String {
        format!("Extract email of {}", action.target.profile_url)
    }
}
