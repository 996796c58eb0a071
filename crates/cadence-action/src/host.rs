//! Automation primitives supplied by the host runtime.
//!
//! The host owns the browsing context. Executors only see this trait, so
//! they can be driven against a real page or a scripted fake alike.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use cadence_core::types::{AccountIdentity, Locator};

use crate::error::ActionError;

/// Opaque reference to an element the host located.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

#[async_trait]
pub trait Host: Send + Sync {
    async fn current_url(&self) -> Result<String, ActionError>;

    /// Switch the host's active target. On a real host this tears down the
    /// current execution context.
    async fn navigate(&self, url: &str) -> Result<(), ActionError>;

    /// Single lookup, no waiting.
    async fn locate(&self, locator: &Locator) -> Result<Option<ElementHandle>, ActionError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), ActionError>;

    async fn set_text(&self, element: &ElementHandle, text: &str) -> Result<(), ActionError>;

    /// Notify the page that an input's value changed (for frameworks that
    /// only read input through change events).
    async fn dispatch_change(&self, element: &ElementHandle) -> Result<(), ActionError>;

    async fn read_text(&self, element: &ElementHandle) -> Result<Option<String>, ActionError>;

    /// The account the host is logged in as, if it can tell.
    async fn account_identity(&self) -> Result<Option<AccountIdentity>, ActionError>;

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl<T: Host + ?Sized> Host for Arc<T> {
    async fn current_url(&self) -> Result<String, ActionError> {
        (**self).current_url().await
    }

    async fn navigate(&self, url: &str) -> Result<(), ActionError> {
        (**self).navigate(url).await
    }

    async fn locate(&self, locator: &Locator) -> Result<Option<ElementHandle>, ActionError> {
        (**self).locate(locator).await
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), ActionError> {
        (**self).click(element).await
    }

    async fn set_text(&self, element: &ElementHandle, text: &str) -> Result<(), ActionError> {
        (**self).set_text(element, text).await
    }

    async fn dispatch_change(&self, element: &ElementHandle) -> Result<(), ActionError> {
        (**self).dispatch_change(element).await
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<Option<String>, ActionError> {
        (**self).read_text(element).await
    }

    async fn account_identity(&self) -> Result<Option<AccountIdentity>, ActionError> {
        (**self).account_identity().await
    }

    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}
