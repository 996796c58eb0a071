//! Scripted page used by the executor tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use cadence_core::types::{AccountIdentity, Locator};

use crate::error::ActionError;
use crate::host::{ElementHandle, Host};

#[derive(Default)]
struct PageState {
    url: String,
    visible: HashSet<String>,
    reveals: HashMap<String, Vec<String>>,
    texts: HashMap<String, String>,
    log: Vec<String>,
    sleeps: Vec<Duration>,
}

/// A page whose elements are keyed by their locator's display form.
/// Clicking an element can reveal others (menus, dialogs).
pub(crate) struct FakePage {
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn at(url: &str) -> Self {
        Self {
            state: Mutex::new(PageState {
                url: url.to_string(),
                ..PageState::default()
            }),
        }
    }

    pub fn show(self, locator: &Locator) -> Self {
        self.state.lock().unwrap().visible.insert(locator.to_string());
        self
    }

    pub fn on_click(self, clicked: &Locator, revealed: &Locator) -> Self {
        self.state
            .lock()
            .unwrap()
            .reveals
            .entry(clicked.to_string())
            .or_default()
            .push(revealed.to_string());
        self
    }

    pub fn with_text(self, locator: &Locator, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(locator.to_string(), text.to_string());
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|e| e.strip_prefix("click:").map(str::to_string))
            .collect()
    }

    pub fn sleeps(&self) -> usize {
        self.state.lock().unwrap().sleeps.len()
    }
}

#[async_trait]
impl Host for FakePage {
    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn navigate(&self, url: &str) -> Result<(), ActionError> {
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.log.push(format!("navigate:{}", url));
        Ok(())
    }

    async fn locate(&self, locator: &Locator) -> Result<Option<ElementHandle>, ActionError> {
        let key = locator.to_string();
        let state = self.state.lock().unwrap();
        Ok(state.visible.contains(&key).then_some(ElementHandle(key)))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), ActionError> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("click:{}", element.0));
        if let Some(revealed) = state.reveals.get(&element.0).cloned() {
            state.visible.extend(revealed);
        }
        Ok(())
    }

    async fn set_text(&self, element: &ElementHandle, text: &str) -> Result<(), ActionError> {
        self.state
            .lock()
            .unwrap()
            .log
            .push(format!("set_text:{}={}", element.0, text));
        Ok(())
    }

    async fn dispatch_change(&self, element: &ElementHandle) -> Result<(), ActionError> {
        self.state
            .lock()
            .unwrap()
            .log
            .push(format!("change:{}", element.0));
        Ok(())
    }

    async fn read_text(&self, element: &ElementHandle) -> Result<Option<String>, ActionError> {
        Ok(self.state.lock().unwrap().texts.get(&element.0).cloned())
    }

    async fn account_identity(&self) -> Result<Option<AccountIdentity>, ActionError> {
        Ok(None)
    }

    async fn sleep(&self, duration: Duration) {
        self.state.lock().unwrap().sleeps.push(duration);
    }
}

/// Executor config with the default locator catalog and no real delays.
pub(crate) fn fast_config() -> cadence_core::config::ExecutorConfig {
    cadence_core::config::ExecutorConfig {
        locate_attempts: 2,
        locate_delay_ms: 0,
        step_delay_min_ms: 0,
        step_delay_max_ms: 0,
        dwell_min_ms: 0,
        dwell_max_ms: 0,
        ..Default::default()
    }
}
