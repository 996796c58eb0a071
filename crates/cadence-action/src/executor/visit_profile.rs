//! Open a profile and spend a human-like moment on it.

use std::sync::Arc;

use async_trait::async_trait;

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::host::Host;
use crate::steps::Steps;
use crate::types::{ActionKind, ActionResult};

pub struct VisitProfileExecutor {
    config: Arc<ExecutorConfig>,
}

impl VisitProfileExecutor {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ActionExecutor for VisitProfileExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::VisitProfile
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
        steps.dwell().await;
        Ok(ActionResult::success("Profile visited"))
    }

    fn describe(&self, action: &ScheduledAction) -> String {
        format!("Visit profile {}", action.target.profile_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, FakePage};
    use cadence_core::types::{ActionId, ActionStatus, ProspectRef};

    const URL: &str = "https://platform.example.com/in/ada";

    fn action() -> ScheduledAction {
        ScheduledAction {
            id: ActionId::new("v1"),
            action_type: "visit_profile".into(),
            target: ProspectRef {
                id: None,
                profile_url: URL.into(),
                name: None,
            },
            payload: serde_json::Value::Null,
            scheduled_for: None,
            status: ActionStatus::Pending,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn test_visit_dwells_on_loaded_profile() {
        let config = fast_config();
        let host = FakePage::at(URL).show(&config.locators.profile_marker[0]);
        let executor = VisitProfileExecutor::new(Arc::new(config));

        let result = executor.execute(&host, &action()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Profile visited");
        assert!(host.clicks().is_empty());
        assert_eq!(host.sleeps(), 1);
    }

    #[tokio::test]
    async fn test_visit_accepts_fallback_marker() {
        let config = fast_config();
        let host = FakePage::at(URL).show(&config.locators.profile_marker[1]);
        let executor = VisitProfileExecutor::new(Arc::new(config));
        assert!(executor.execute(&host, &action()).await.unwrap().success);
    }
}
