//! Conversation sync: fetch inbox pages through the platform API and
//! resolve them into views.

use reqwest::Url;
use tracing::info;

use cadence_core::config::PlatformConfig;
use cadence_core::error::Result;
use cadence_graph::{ConversationView, MessageView, Resolver, ResolverOptions};

use crate::platform::{PlatformApi, PlatformRequest};

pub struct ConversationSync<P> {
    platform: P,
    resolver: Resolver,
    conversations_endpoint: String,
    messages_endpoint: String,
}

impl<P: PlatformApi> ConversationSync<P> {
    pub fn new(platform: P, resolver: Resolver, config: &PlatformConfig) -> Self {
        Self {
            platform,
            resolver,
            conversations_endpoint: config.conversations_endpoint.clone(),
            messages_endpoint: config.messages_endpoint.clone(),
        }
    }

    pub async fn conversations(&self) -> Result<Vec<ConversationView>> {
        let response = self
            .platform
            .request(&PlatformRequest::get(&self.conversations_endpoint))
            .await?;
        let views = self.resolver.conversations(&response);
        info!(count = views.len(), "Synced conversations");
        Ok(views)
    }

    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<MessageView>> {
        let endpoint = self
            .messages_endpoint
            .replace("{conversation_id}", &encode_segment(conversation_id));
        let response = self.platform.request(&PlatformRequest::get(endpoint)).await?;
        let messages = self.resolver.messages(&response);
        info!(conversation = conversation_id, count = messages.len(), "Synced messages");
        Ok(messages)
    }
}

/// Resolver configured for the platform's profile URLs.
pub fn resolver_for(config: &PlatformConfig, self_key: Option<String>) -> Resolver {
    Resolver::new(ResolverOptions {
        profile_base_url: Some(config.profile_base_url.clone()),
        self_key,
        ..ResolverOptions::default()
    })
}

/// Percent-encode `raw` as a single path segment.
fn encode_segment(raw: &str) -> String {
    let Ok(mut url) = Url::parse("http://segment.invalid/") else {
        return raw.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(raw);
    }
    url.path().trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use cadence_graph::NormalizedResponse;
    use serde_json::json;

    use crate::error::ApiError;

    /// Records requested endpoints and replays one canned payload.
    struct Canned {
        payload: serde_json::Value,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlatformApi for Canned {
        async fn request(&self, req: &PlatformRequest) -> std::result::Result<NormalizedResponse, ApiError> {
            self.seen.lock().unwrap().push(req.endpoint.clone());
            NormalizedResponse::from_value(self.payload.clone())
                .map_err(|e| ApiError::InvalidResponse(e.to_string()))
        }
    }

    struct Down;

    #[async_trait]
    impl PlatformApi for Down {
        async fn request(&self, _req: &PlatformRequest) -> std::result::Result<NormalizedResponse, ApiError> {
            Err(ApiError::AuthExpired { status: 401 })
        }
    }

    fn config() -> PlatformConfig {
        PlatformConfig::default()
    }

    #[tokio::test]
    async fn test_conversations_resolve_through_platform() {
        let platform = Canned {
            payload: json!({
                "elements": [{ "entityUrn": "urn:conv:1", "*participants": ["me", "them"], "unreadCount": 1 }],
                "included": [
                    { "entityUrn": "me", "isSelf": true },
                    { "entityUrn": "them", "firstName": "Ada", "publicIdentifier": "ada" }
                ]
            }),
            seen: Mutex::new(Vec::new()),
        };
        let cfg = config();
        let sync = ConversationSync::new(platform, resolver_for(&cfg, None), &cfg);

        let views = sync.conversations().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].participant_name.as_deref(), Some("Ada"));
        assert_eq!(
            views[0].participant_url.as_deref(),
            Some("https://platform.example.com/in/ada")
        );
        assert_eq!(
            sync.platform.seen.lock().unwrap().as_slice(),
            ["/messaging/conversations".to_string()]
        );
    }

    #[tokio::test]
    async fn test_messages_endpoint_substitutes_encoded_key() {
        let platform = Canned {
            payload: json!({ "elements": [] }),
            seen: Mutex::new(Vec::new()),
        };
        let cfg = config();
        let sync = ConversationSync::new(platform, Resolver::default(), &cfg);
        sync.messages("urn:conv:(a,b)").await.unwrap();
        sync.messages("thread/1 #2").await.unwrap();
        let seen = sync.platform.seen.lock().unwrap();
        assert_eq!(seen[0], "/messaging/conversations/urn:conv:(a,b)/events");
        assert_eq!(seen[1], "/messaging/conversations/thread%2F1%20%232/events");
    }

    #[tokio::test]
    async fn test_errors_convert_to_core_error() {
        let cfg = config();
        let sync = ConversationSync::new(Down, Resolver::default(), &cfg);
        let err = sync.conversations().await.unwrap_err();
        assert!(matches!(err, cadence_core::CadenceError::AuthExpired));
    }
}
