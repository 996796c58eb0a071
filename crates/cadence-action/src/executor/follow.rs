//! Follow a profile.

use std::sync::Arc;

use async_trait::async_trait;

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::host::Host;
use crate::steps::Steps;
use crate::types::{ActionKind, ActionResult};

pub struct FollowExecutor {
    config: Arc<ExecutorConfig>,
}

impl FollowExecutor {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ActionExecutor for FollowExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::Follow
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
        steps.follow(rel).await
    }

    fn describe(&self, action: &ScheduledAction) -> String {
        format!("Follow {}", action.target.profile_url)
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
            id: ActionId::new("f1"),
            action_type: "follow".into(),
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
    async fn test_already_following_short_circuits() {
        let config = fast_config();
        let l = &config.locators;
        let host = FakePage::at(URL)
            .show(&l.profile_marker[0])
            .show(&l.following_marker[0])
            .show(&l.follow_button[0]);
        let executor = FollowExecutor::new(Arc::new(config));

        let result = executor.execute(&host, &action()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Already following");
        assert!(host.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_follow_via_primary_button() {
        let config = fast_config();
        let l = &config.locators;
        let host = FakePage::at(URL)
            .show(&l.profile_marker[0])
            .show(&l.follow_button[0]);
        let follow = l.follow_button[0].to_string();
        let executor = FollowExecutor::new(Arc::new(config));

        let result = executor.execute(&host, &action()).await.unwrap();
        assert_eq!(result.message, "Followed");
        assert_eq!(host.clicks(), vec![follow]);
    }

    #[tokio::test]
    async fn test_follow_via_overflow_menu() {
        let config = fast_config();
        let l = &config.locators;
        let host = FakePage::at(URL)
            .show(&l.profile_marker[0])
            .show(&l.more_actions_button[0])
            .on_click(&l.more_actions_button[0], &l.follow_menu_item[0]);
        let expected = vec![
            l.more_actions_button[0].to_string(),
            l.follow_menu_item[0].to_string(),
        ];
        let executor = FollowExecutor::new(Arc::new(config));

        let result = executor.execute(&host, &action()).await.unwrap();
        assert!(result.success);
        assert_eq!(host.clicks(), expected);
    }
}
