//! Warm a profile up before inviting: visit, dwell, optionally follow,
//! then connect.
//!
//! Payload: `follow` (bool, default true), `note` (optional template).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use cadence_core::config::ExecutorConfig;
use cadence_core::types::ScheduledAction;

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::host::Host;
use crate::steps::Steps;
use crate::types::{ActionKind, ActionResult};

pub struct WarmupConnectExecutor {
    config: Arc<ExecutorConfig>,
}

impl WarmupConnectExecutor {
    pub fn new(config: Arc<ExecutorConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ActionExecutor for WarmupConnectExecutor {
    fn kind(&self) -> ActionKind {
        ActionKind::WarmupConnect
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
        if rel.invite_settled() {
            return steps.connect(rel, &action.target, None).await;
        }

        steps.dwell().await;

        let followed = action.payload_bool("follow", true) && !rel.following;
        if followed {
            steps.follow(rel).await?;
        }

        let mut result = steps
            .connect(rel, &action.target, action.payload_str("note"))
            .await?;
        if result.success {
            let note_included = result
                .output
                .as_ref()
                .and_then(|o| o.get("note_included"))
                .cloned()
                .unwrap_or(json!(false));
            result.output = Some(json!({
                "followed": followed,
                "note_included": note_included,
            }));
        }
        Ok(result)
    }

    fn describe(&self, action: &ScheduledAction) -> String {
        format!("Warm up and connect with {}", action.target.profile_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, FakePage};
    use cadence_core::types::{ActionId, ActionStatus, ProspectRef};

    const URL: &str = "https://platform.example.com/in/ada";

    fn action(payload: serde_json::Value) -> ScheduledAction {
        ScheduledAction {
            id: ActionId::new("w1"),
            action_type: "warmup_connect".into(),
            target: ProspectRef {
                id: None,
                profile_url: URL.into(),
                name: Some("Ada Lovelace".into()),
            },
            payload,
            scheduled_for: None,
            status: ActionStatus::Pending,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn test_full_warmup_sequence() {
        let config = fast_config();
        let l = &config.locators;
        let host = FakePage::at(URL)
            .show(&l.profile_marker[0])
            .show(&l.follow_button[0])
            .show(&l.connect_button[0])
            .on_click(&l.connect_button[0], &l.send_invite_button[0]);
        let expected = vec![
            l.follow_button[0].to_string(),
            l.connect_button[0].to_string(),
            l.send_invite_button[0].to_string(),
        ];
        let executor = WarmupConnectExecutor::new(Arc::new(config));

        let result = executor.execute(&host, &action(json!({}))).await.unwrap();
        assert!(result.success);
        assert_eq!(host.clicks(), expected);
        assert_eq!(
            result.output,
            Some(json!({ "followed": true, "note_included": false }))
        );
    }

    #[tokio::test]
    async fn test_skips_follow_when_disabled() {
        let config = fast_config();
        let l = &config.locators;
        let host = FakePage::at(URL)
            .show(&l.profile_marker[0])
            .show(&l.follow_button[0])
            .show(&l.connect_button[0])
            .show(&l.send_invite_button[0]);
        let follow = l.follow_button[0].to_string();
        let executor = WarmupConnectExecutor::new(Arc::new(config));

        let result = executor
            .execute(&host, &action(json!({ "follow": false })))
            .await
            .unwrap();
        assert!(result.success);
        assert!(!host.clicks().contains(&follow));
    }

    #[tokio::test]
    async fn test_pending_invite_skips_everything() {
        let config = fast_config();
        let l = &config.locators;
        let host = FakePage::at(URL)
            .show(&l.profile_marker[0])
            .show(&l.pending_marker[0])
            .show(&l.follow_button[0]);
        let executor = WarmupConnectExecutor::new(Arc::new(config));

        let result = executor.execute(&host, &action(json!({}))).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Invitation already pending");
        assert!(host.clicks().is_empty());
        assert_eq!(host.sleeps(), 0);
    }
}
