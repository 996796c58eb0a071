//! Persisted runner snapshot.
//!
//! The snapshot is what lets a run survive the host tearing down its
//! execution context: a fresh context loads it and picks up where the old
//! one left off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cadence_api::ActionReport;
use cadence_core::error::Result;
use cadence_core::types::{ActionId, RunnerPhase, ScheduledAction};
use cadence_storage::{load_json, save_json, StateStore};

/// Key of the runner snapshot. Removed when the runner stops.
pub const STATE_KEY: &str = "cadence.runner.state";
/// Set once the account passed verification; lives as long as the session.
pub const VERIFIED_KEY: &str = "cadence.session.verified";
/// Reason of the last stop, kept after the snapshot is gone.
pub const LAST_STOP_KEY: &str = "cadence.runner.last_stop";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerStats {
    pub completed: u64,
    pub failed: u64,
    pub context_switches: u64,
    pub started_at: DateTime<Utc>,
}

impl RunnerStats {
    fn new() -> Self {
        Self {
            completed: 0,
            failed: 0,
            context_switches: 0,
            started_at: Utc::now(),
        }
    }
}

/// An outcome that was decided but not yet acknowledged by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReport {
    pub action_id: ActionId,
    pub report: ActionReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerState {
    pub run_id: Uuid,
    pub phase: RunnerPhase,
    /// Action fetched but not yet finished. At most one at a time.
    #[serde(default)]
    pub current_action: Option<ScheduledAction>,
    /// Context switches spent on `current_action`.
    #[serde(default)]
    pub context_switches: u32,
    #[serde(default)]
    pub pending_report: Option<PendingReport>,
    #[serde(default)]
    pub verified: bool,
    pub stats: RunnerStats,
}

impl RunnerState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: RunnerPhase::Init,
            current_action: None,
            context_switches: 0,
            pending_report: None,
            verified: false,
            stats: RunnerStats::new(),
        }
    }

    pub fn load(store: &dyn StateStore) -> Result<Option<Self>> {
        load_json(store, STATE_KEY)
    }

    pub fn save(&self, store: &dyn StateStore) -> Result<()> {
        save_json(store, STATE_KEY, self)
    }

    pub fn clear(store: &dyn StateStore) -> Result<()> {
        store.remove(STATE_KEY)
    }
}

impl Default for RunnerState {
    fn default() -> Self {
        Self::new()
    }
}
