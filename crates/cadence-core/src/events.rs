use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{ActionId, RunnerPhase};

/// Status events emitted by the runner for the surrounding UI.
///
/// Delivery is fire-and-forget: nothing waits for a consumer and a missing
/// subscriber is not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RunnerEvent {
    /// The runner moved to a new phase.
    PhaseChanged { phase: RunnerPhase },

    /// The logged-in account was accepted by the verification API.
    AccountVerified { profile_url: String },

    /// An action was handed to its executor.
    ActionStarted {
        action_id: ActionId,
        action_type: String,
    },

    /// An action finished and its result was reported to the queue.
    ActionFinished {
        action_id: ActionId,
        success: bool,
        message: String,
    },

    /// An action needs the host to move elsewhere; the current execution
    /// context is about to end.
    ContextSwitch { action_id: ActionId, url: String },

    /// A recoverable problem; the runner keeps going after a cooldown.
    Error { message: String },

    /// The runner stopped for good (until the next `start`).
    Stopped { reason: String },
}

/// Broadcast-backed notification sink.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: broadcast::Sender<RunnerEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunnerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: RunnerEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(256)
    }
}
