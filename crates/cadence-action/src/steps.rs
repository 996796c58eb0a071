//! Building blocks shared by the executors.
//!
//! Composite executors are sequences of these steps, so a goal that is
//! already met (connected, invited, following) is detected in one place.

use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tracing::{debug, info};

use cadence_core::config::ExecutorConfig;
use cadence_core::types::{Locator, ProspectRef};

use crate::error::ActionError;
use crate::host::{ElementHandle, Host};
use crate::locator::{find_element, probe};
use crate::template;
use crate::types::{ActionResult, Relationship};

pub(crate) struct Steps<'a> {
    pub host: &'a dyn Host,
    pub config: &'a ExecutorConfig,
}

impl<'a> Steps<'a> {
    pub fn new(host: &'a dyn Host, config: &'a ExecutorConfig) -> Self {
        Self { host, config }
    }

    /// `Some(context switch)` when the host is not on `target_url`. Nothing
    /// is touched on the page in either case.
    pub async fn ensure_at(&self, target_url: &str) -> Result<Option<ActionResult>, ActionError> {
        let current = self.host.current_url().await?;
        if same_page(&current, target_url) {
            return Ok(None);
        }
        debug!(current = %current, target = %target_url, "Host not positioned");
        Ok(Some(ActionResult::context_switch(target_url)))
    }

    pub async fn wait_for_profile(&self) -> Result<(), ActionError> {
        self.find(&self.config.locators.profile_marker, "profile header")
            .await
            .map(|_| ())
    }

    pub async fn find(&self, chain: &[Locator], what: &str) -> Result<ElementHandle, ActionError> {
        find_element(
            self.host,
            chain,
            what,
            self.config.locate_attempts,
            Duration::from_millis(self.config.locate_delay_ms),
        )
        .await
    }

    pub async fn probe(&self, chain: &[Locator]) -> Result<Option<ElementHandle>, ActionError> {
        probe(self.host, chain).await
    }

    pub async fn click(&self, chain: &[Locator], what: &str) -> Result<(), ActionError> {
        let element = self.find(chain, what).await?;
        self.host.click(&element).await?;
        self.pause().await;
        Ok(())
    }

    /// Click a primary control, or open the overflow menu and click the
    /// equivalent item when the primary control is not shown.
    pub async fn click_or_menu(
        &self,
        primary: &[Locator],
        menu_item: &[Locator],
        what: &str,
    ) -> Result<(), ActionError> {
        if let Some(element) = self.probe(primary).await? {
            self.host.click(&element).await?;
            self.pause().await;
            return Ok(());
        }
        debug!(what, "Primary control absent, trying overflow menu");
        self.click(&self.config.locators.more_actions_button, "more actions menu")
            .await?;
        self.click(menu_item, what).await
    }

    pub async fn type_into(&self, chain: &[Locator], what: &str, text: &str) -> Result<(), ActionError> {
        let element = self.find(chain, what).await?;
        self.host.set_text(&element, text).await?;
        self.host.dispatch_change(&element).await?;
        self.pause().await;
        Ok(())
    }

    pub async fn relationship(&self) -> Result<Relationship, ActionError> {
        let locators = &self.config.locators;
        let connected = self.probe(&locators.connected_marker).await?.is_some();
        let pending = !connected && self.probe(&locators.pending_marker).await?.is_some();
        let following = self.probe(&locators.following_marker).await?.is_some();
        Ok(Relationship {
            connected,
            pending,
            following,
        })
    }

    /// Randomized pause between interactive steps.
    pub async fn pause(&self) {
        let delay = random_delay(self.config.step_delay_min_ms, self.config.step_delay_max_ms);
        self.host.sleep(delay).await;
    }

    /// Randomized time spent on a page before interacting.
    pub async fn dwell(&self) {
        let delay = random_delay(self.config.dwell_min_ms, self.config.dwell_max_ms);
        debug!(dwell_ms = delay.as_millis() as u64, "Dwelling on profile");
        self.host.sleep(delay).await;
    }

    // -------------------------------------------------------------------------
    // Goals
    // -------------------------------------------------------------------------

    pub async fn follow(&self, rel: Relationship) -> Result<ActionResult, ActionError> {
        if rel.following || rel.connected {
            return Ok(ActionResult::success("Already following"));
        }
        let locators = &self.config.locators;
        self.click_or_menu(&locators.follow_button, &locators.follow_menu_item, "follow button")
            .await?;
        info!("Followed profile");
        Ok(ActionResult::success("Followed"))
    }

    pub async fn connect(
        &self,
        rel: Relationship,
        target: &ProspectRef,
        note_template: Option<&str>,
    ) -> Result<ActionResult, ActionError> {
        if rel.connected {
            return Ok(ActionResult::success("Already connected"));
        }
        if rel.pending {
            return Ok(ActionResult::success("Invitation already pending"));
        }

        let locators = &self.config.locators;
        self.click_or_menu(&locators.connect_button, &locators.connect_menu_item, "connect button")
            .await?;

        let note = note_template
            .and_then(|t| template::render(t, target, self.config.note_max_chars));
        if let Some(note) = &note {
            self.click(&locators.add_note_button, "add note button").await?;
            self.type_into(&locators.note_field, "note field", note).await?;
        }
        self.click(&locators.send_invite_button, "send invitation button")
            .await?;

        info!(with_note = note.is_some(), "Invitation sent");
        Ok(ActionResult::success("Invitation sent").with_output(json!({
            "note_included": note.is_some(),
        })))
    }

    pub async fn message(
        &self,
        rel: Relationship,
        target: &ProspectRef,
        text_template: &str,
    ) -> Result<ActionResult, ActionError> {
        if !rel.connected {
            return Ok(ActionResult::failure(
                "Not connected with this profile; cannot send a message",
                false,
            ));
        }
        // Messages are not subject to the invitation note limit.
        let Some(text) = template::render(text_template, target, usize::MAX) else {
            return Err(ActionError::InvalidPayload("Message text is empty".to_string()));
        };

        let locators = &self.config.locators;
        self.click(&locators.message_button, "message button").await?;
        self.type_into(&locators.message_field, "message field", &text)
            .await?;
        self.click(&locators.message_send_button, "send message button")
            .await?;

        info!("Message sent");
        Ok(ActionResult::success("Message sent"))
    }
}

/// Uniform random duration in `[min_ms, max_ms]`; bounds may be given in
/// either order.
pub fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    let (lo, hi) = if min_ms <= max_ms {
        (min_ms, max_ms)
    } else {
        (max_ms, min_ms)
    };
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

/// Whether two URLs point at the same page, ignoring scheme, `www.`,
/// query, fragment, trailing slashes and case.
pub fn same_page(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_url(a), normalize_url(b));
    !a.is_empty() && a == b
}

fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let url = url.strip_prefix("www.").unwrap_or(url);
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.trim_end_matches('/').to_lowercase()
}
