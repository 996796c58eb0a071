//! The queue runner.
//!
//! Pulls one action at a time from the remote queue, hands it to its
//! executor, reports the outcome and waits a randomized delay before the
//! next poll. Every phase change is persisted so the run survives the host
//! tearing down the execution context: executors ask for that teardown
//! themselves when the host has to move to another page.
//!
//! Pause and stop requests are cooperative. They are observed at loop
//! boundaries and during sleeps, never in the middle of an action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use cadence_action::{random_delay, ActionResult, ExecutorRegistry, Host};
use cadence_api::{ActionReport, QueueClient};
use cadence_core::config::RunnerConfig;
use cadence_core::error::CadenceError;
use cadence_core::events::{Notifier, RunnerEvent};
use cadence_core::types::{ActionId, RunnerPhase, ScheduledAction};
use cadence_storage::StateStore;

use crate::error::RunnerError;
use crate::state::{PendingReport, RunnerState, RunnerStats, LAST_STOP_KEY, VERIFIED_KEY};
use crate::state_machine::validate_transition;

pub const REASON_COMPLETED: &str = "completed";
pub const REASON_DAILY_LIMIT: &str = "daily limit reached";
pub const REASON_AUTH_EXPIRED: &str = "authentication expired";
pub const REASON_VERIFY_FAILED: &str = "account verification failed";

const VERIFY_ATTEMPTS: u32 = 3;

/// Collaborators the runner drives.
pub struct RunnerDeps {
    pub store: Arc<dyn StateStore>,
    pub queue: Arc<dyn QueueClient>,
    pub registry: Arc<ExecutorRegistry>,
    pub host: Arc<dyn Host>,
    pub notifier: Notifier,
}

/// Why a call into the runner returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A loop is already live (here, or persisted as running).
    AlreadyRunning,
    /// There was nothing to resume.
    Idle,
    /// The host must move to `url`; this execution context is ending.
    ContextSwitch { action_id: ActionId, url: String },
    Paused,
    Stopped { reason: String },
}

/// Snapshot for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerStatus {
    pub phase: RunnerPhase,
    pub current_action: Option<ActionId>,
    pub pending_report: bool,
    pub verified: bool,
    pub stats: Option<RunnerStats>,
}

impl RunnerStatus {
    /// Read the status from a session store without a live runner.
    pub fn load(store: &dyn StateStore) -> Result<Self, RunnerError> {
        let verified = store.get(VERIFIED_KEY)?.as_deref() == Some("true");
        let status = match RunnerState::load(store)? {
            Some(state) => Self {
                phase: state.phase,
                current_action: state.current_action.map(|a| a.id),
                pending_report: state.pending_report.is_some(),
                verified,
                stats: Some(state.stats),
            },
            None => Self {
                phase: store
                    .get(LAST_STOP_KEY)?
                    .map(RunnerPhase::stopped)
                    .unwrap_or_default(),
                current_action: None,
                pending_report: false,
                verified,
                stats: None,
            },
        };
        Ok(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Request {
    Pause,
    Stop(String),
}

pub struct Runner {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn QueueClient>,
    registry: Arc<ExecutorRegistry>,
    host: Arc<dyn Host>,
    notifier: Notifier,
    config: RunnerConfig,
    loop_active: AtomicBool,
    request: Mutex<Option<Request>>,
    wake: Notify,
}

impl Runner {
    pub fn new(deps: RunnerDeps, config: RunnerConfig) -> Self {
        Self {
            store: deps.store,
            queue: deps.queue,
            registry: deps.registry,
            host: deps.host,
            notifier: deps.notifier,
            config,
            loop_active: AtomicBool::new(false),
            request: Mutex::new(None),
            wake: Notify::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Public surface
    // -------------------------------------------------------------------------

    /// Start a run: verify the account (once per session), then poll until
    /// stopped. A paused run is resumed instead of restarted.
    pub async fn start(&self) -> Result<RunOutcome, RunnerError> {
        if !self.claim_loop() {
            debug!("start ignored: loop already live");
            return Ok(RunOutcome::AlreadyRunning);
        }
        let result = self.start_inner().await;
        self.release_loop(result)
    }

    /// Continue a run in a fresh execution context. A decided but
    /// unacknowledged report is re-sent; otherwise an unfinished action is
    /// executed again. Safe to call more than once.
    pub async fn resume_after_teardown(&self) -> Result<RunOutcome, RunnerError> {
        if !self.claim_loop() {
            debug!("resume ignored: loop already live");
            return Ok(RunOutcome::AlreadyRunning);
        }
        let result = self.resume_after_teardown_inner().await;
        self.release_loop(result)
    }

    /// Leave the paused phase and continue polling.
    pub async fn resume(&self) -> Result<RunOutcome, RunnerError> {
        if !self.claim_loop() {
            return Ok(RunOutcome::AlreadyRunning);
        }
        let result = self.resume_inner().await;
        self.release_loop(result)
    }

    /// Ask the loop to pause at its next boundary.
    pub fn pause(&self) -> Result<(), RunnerError> {
        self.submit(Request::Pause)
    }

    /// Ask the loop to stop at its next boundary. Without a live loop the
    /// persisted run is stopped right away.
    pub fn stop(&self, reason: impl Into<String>) -> Result<(), RunnerError> {
        self.submit(Request::Stop(reason.into()))
    }

    pub fn status(&self) -> Result<RunnerStatus, RunnerError> {
        RunnerStatus::load(self.store.as_ref())
    }

    // -------------------------------------------------------------------------
    // Entry points
    // -------------------------------------------------------------------------

    async fn start_inner(&self) -> Result<RunOutcome, RunnerError> {
        if let Some(state) = RunnerState::load(self.store.as_ref())? {
            if state.phase.is_running() {
                info!(phase = %state.phase, "Run already in progress; waiting for resume");
                return Ok(RunOutcome::AlreadyRunning);
            }
            if state.phase == RunnerPhase::Paused {
                return self.resume_inner().await;
            }
        }

        let mut state = RunnerState::new();
        info!(run_id = %state.run_id, "Starting runner");
        self.transition(&mut state, RunnerPhase::Verifying)?;
        if let Some(outcome) = self.verify(&mut state).await? {
            return Ok(outcome);
        }
        self.transition(&mut state, RunnerPhase::Polling)?;
        self.run_loop(state).await
    }

    async fn resume_after_teardown_inner(&self) -> Result<RunOutcome, RunnerError> {
        let Some(mut state) = RunnerState::load(self.store.as_ref())? else {
            debug!("Nothing to resume");
            return Ok(RunOutcome::Idle);
        };
        if !state.phase.is_running() {
            debug!(phase = %state.phase, "Persisted run is not active");
            return Ok(RunOutcome::Idle);
        }

        info!(
            run_id = %state.run_id,
            phase = %state.phase,
            current_action = ?state.current_action.as_ref().map(|a| a.id.as_str()),
            "Resuming after context teardown"
        );
        if state.phase == RunnerPhase::Verifying {
            if let Some(outcome) = self.verify(&mut state).await? {
                return Ok(outcome);
            }
            self.transition(&mut state, RunnerPhase::Polling)?;
        }
        self.run_loop(state).await
    }

    async fn resume_inner(&self) -> Result<RunOutcome, RunnerError> {
        let state = RunnerState::load(self.store.as_ref())?;
        let mut state = match state {
            Some(state) if state.phase == RunnerPhase::Paused => state,
            Some(state) => return Err(RunnerError::NotPaused(state.phase)),
            None => return Err(RunnerError::NotPaused(self.status()?.phase)),
        };
        info!(run_id = %state.run_id, "Resuming paused run");
        self.transition(&mut state, RunnerPhase::Polling)?;
        self.run_loop(state).await
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    async fn verify(&self, state: &mut RunnerState) -> Result<Option<RunOutcome>, RunnerError> {
        if self.session_verified()? {
            debug!("Account already verified this session");
            state.verified = true;
            return Ok(None);
        }

        let identity = match self.host.account_identity().await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                warn!("Host could not tell which account is logged in");
                return self.finish(state, REASON_VERIFY_FAILED).map(Some);
            }
            Err(e) => {
                warn!(error = %e, "Reading the logged-in account failed");
                return self.finish(state, REASON_VERIFY_FAILED).map(Some);
            }
        };

        for attempt in 1..=VERIFY_ATTEMPTS {
            match self.queue.verify_account(&identity).await {
                Ok(resp) if resp.is_verified() => {
                    info!(profile_url = %identity.profile_url, "Account verified");
                    self.store.set(VERIFIED_KEY, "true")?;
                    state.verified = true;
                    state.save(self.store.as_ref())?;
                    self.notifier.emit(RunnerEvent::AccountVerified {
                        profile_url: identity.profile_url.clone(),
                    });
                    return Ok(None);
                }
                Ok(_) => {
                    warn!(profile_url = %identity.profile_url, "Account rejected by verification");
                    return self.finish(state, REASON_VERIFY_FAILED).map(Some);
                }
                Err(CadenceError::AuthExpired) => {
                    return self.finish(state, REASON_AUTH_EXPIRED).map(Some);
                }
                Err(e) if attempt < VERIFY_ATTEMPTS => {
                    warn!(attempt, error = %e, "Verification request failed; retrying");
                    self.sleep(self.config.fetch_cooldown()).await;
                }
                Err(e) => {
                    error!(error = %e, "Verification request failed");
                }
            }
        }
        self.finish(state, REASON_VERIFY_FAILED).map(Some)
    }

    // -------------------------------------------------------------------------
    // Poll loop
    // -------------------------------------------------------------------------

    async fn run_loop(&self, mut state: RunnerState) -> Result<RunOutcome, RunnerError> {
        let mut empty_polls = 0u32;
        loop {
            if let Some(outcome) = self.observe_request(&mut state)? {
                return Ok(outcome);
            }
            match self.step(&mut state, &mut empty_polls).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(RunnerError::Core(CadenceError::AuthExpired)) => {
                    error!("Authentication expired; stopping");
                    return self.finish(&mut state, REASON_AUTH_EXPIRED);
                }
                Err(RunnerError::Core(e @ CadenceError::RateLimited { .. })) => {
                    let wait = self.backoff(&e);
                    warn!(wait_ms = wait.as_millis() as u64, "Queue rate limited; backing off");
                    self.sleep(wait).await;
                }
                Err(e @ RunnerError::InvalidTransition(..)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Runner iteration failed; cooling down");
                    self.notifier.emit(RunnerEvent::Error {
                        message: e.to_string(),
                    });
                    self.sleep(self.config.fetch_cooldown()).await;
                }
            }
        }
    }

    /// One iteration: finish leftover work, or poll and run a new action.
    async fn step(
        &self,
        state: &mut RunnerState,
        empty_polls: &mut u32,
    ) -> Result<Option<RunOutcome>, RunnerError> {
        if state.pending_report.is_some() {
            self.deliver_report(state).await?;
            return self.wait_between_actions(state).await;
        }
        if let Some(action) = state.current_action.clone() {
            return self.execute(state, action).await;
        }

        self.transition(state, RunnerPhase::Polling)?;
        let next = self.queue.next_action().await?;
        if next.quota_exhausted() {
            info!("Daily quota used up");
            return self.finish(state, REASON_DAILY_LIMIT).map(Some);
        }
        let Some(action) = next.into_action() else {
            *empty_polls += 1;
            debug!(empty_polls = *empty_polls, "Queue empty");
            if *empty_polls >= self.config.empty_poll_limit {
                info!("Queue drained");
                return self.finish(state, REASON_COMPLETED).map(Some);
            }
            self.transition(state, RunnerPhase::Waiting)?;
            self.sleep(self.config.idle_poll()).await;
            return Ok(None);
        };
        *empty_polls = 0;

        state.current_action = Some(action.clone());
        state.context_switches = 0;
        self.execute(state, action).await
    }

    async fn execute(
        &self,
        state: &mut RunnerState,
        action: ScheduledAction,
    ) -> Result<Option<RunOutcome>, RunnerError> {
        self.transition(state, RunnerPhase::Executing)?;
        self.notifier.emit(RunnerEvent::ActionStarted {
            action_id: action.id.clone(),
            action_type: action.action_type.clone(),
        });

        let mut result = self.registry.dispatch(self.host.as_ref(), &action).await;

        if result.requires_context_switch {
            state.context_switches += 1;
            state.stats.context_switches += 1;
            if state.context_switches > self.config.max_context_switches {
                warn!(
                    action_id = %action.id,
                    switches = state.context_switches,
                    "Too many context switches; giving up on action"
                );
                result = ActionResult::failure(
                    format!("Gave up after {} context switches", state.context_switches),
                    true,
                );
            } else {
                let url = result
                    .navigate_to
                    .clone()
                    .unwrap_or_else(|| action.target.profile_url.clone());
                state.save(self.store.as_ref())?;
                info!(action_id = %action.id, url = %url, "Context switch");
                self.notifier.emit(RunnerEvent::ContextSwitch {
                    action_id: action.id.clone(),
                    url: url.clone(),
                });
                self.host.navigate(&url).await?;
                return Ok(Some(RunOutcome::ContextSwitch {
                    action_id: action.id,
                    url,
                }));
            }
        }

        if result.success {
            state.stats.completed += 1;
        } else {
            state.stats.failed += 1;
        }
        // Outcome and "no current action" are persisted together, so a
        // teardown from here on re-sends the report instead of re-running.
        state.pending_report = Some(PendingReport {
            action_id: action.id.clone(),
            report: report_for(&result),
        });
        state.current_action = None;
        state.context_switches = 0;
        state.save(self.store.as_ref())?;

        self.deliver_report(state).await?;
        self.wait_between_actions(state).await
    }

    async fn wait_between_actions(
        &self,
        state: &mut RunnerState,
    ) -> Result<Option<RunOutcome>, RunnerError> {
        self.transition(state, RunnerPhase::Waiting)?;
        let delay = random_delay(self.config.min_delay_ms, self.config.max_delay_ms);
        debug!(delay_ms = delay.as_millis() as u64, "Waiting before next poll");
        self.sleep(delay).await;
        Ok(None)
    }

    /// Send the pending report, retrying with cooldowns. A report the queue
    /// keeps refusing is dropped after the last attempt.
    async fn deliver_report(&self, state: &mut RunnerState) -> Result<(), RunnerError> {
        let Some(pending) = state.pending_report.clone() else {
            return Ok(());
        };
        let attempts = self.config.report_attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .queue
                .complete_action(&pending.action_id, &pending.report)
                .await
            {
                Ok(()) => {
                    debug!(action_id = %pending.action_id, "Report delivered");
                    state.pending_report = None;
                    state.save(self.store.as_ref())?;
                    self.notifier.emit(RunnerEvent::ActionFinished {
                        action_id: pending.action_id.clone(),
                        success: pending.report.is_success(),
                        message: report_message(&pending.report),
                    });
                    return Ok(());
                }
                Err(e @ CadenceError::AuthExpired) => return Err(e.into()),
                Err(e) if attempt < attempts => {
                    warn!(action_id = %pending.action_id, attempt, error = %e, "Report failed; retrying");
                    self.sleep(self.backoff(&e)).await;
                }
                Err(e) => {
                    error!(action_id = %pending.action_id, error = %e, "Report failed; dropping it");
                    self.notifier.emit(RunnerEvent::Error {
                        message: format!("Could not report action {}: {}", pending.action_id, e),
                    });
                }
            }
        }
        state.pending_report = None;
        state.save(self.store.as_ref())?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Phases and requests
    // -------------------------------------------------------------------------

    fn transition(&self, state: &mut RunnerState, to: RunnerPhase) -> Result<(), RunnerError> {
        if state.phase == to {
            return Ok(());
        }
        validate_transition(&state.phase, &to)?;
        debug!(from = %state.phase, to = %to, "Phase transition");
        state.phase = to.clone();
        state.save(self.store.as_ref())?;
        self.notifier.emit(RunnerEvent::PhaseChanged { phase: to });
        Ok(())
    }

    /// Stop the run: the snapshot is removed and only the reason is kept.
    fn finish(
        &self,
        state: &mut RunnerState,
        reason: impl Into<String>,
    ) -> Result<RunOutcome, RunnerError> {
        let reason = reason.into();
        let phase = RunnerPhase::stopped(reason.clone());
        validate_transition(&state.phase, &phase)?;
        state.phase = phase.clone();

        RunnerState::clear(self.store.as_ref())?;
        self.store.set(LAST_STOP_KEY, &reason)?;
        info!(
            run_id = %state.run_id,
            reason = %reason,
            completed = state.stats.completed,
            failed = state.stats.failed,
            "Runner stopped"
        );
        self.notifier.emit(RunnerEvent::PhaseChanged { phase });
        self.notifier.emit(RunnerEvent::Stopped {
            reason: reason.clone(),
        });
        Ok(RunOutcome::Stopped { reason })
    }

    fn observe_request(&self, state: &mut RunnerState) -> Result<Option<RunOutcome>, RunnerError> {
        match self.take_request() {
            None => Ok(None),
            Some(Request::Stop(reason)) => self.finish(state, reason).map(Some),
            Some(Request::Pause) => {
                self.transition(state, RunnerPhase::Paused)?;
                info!(run_id = %state.run_id, "Runner paused");
                Ok(Some(RunOutcome::Paused))
            }
        }
    }

    fn submit(&self, request: Request) -> Result<(), RunnerError> {
        {
            let mut slot = self.request.lock().unwrap_or_else(|e| e.into_inner());
            // A pending stop is never downgraded to a pause.
            if !matches!(*slot, Some(Request::Stop(_))) || matches!(request, Request::Stop(_)) {
                *slot = Some(request);
            }
        }
        self.wake.notify_one();
        if !self.loop_active.load(Ordering::SeqCst) {
            self.apply_request_offline()?;
        }
        Ok(())
    }

    /// Apply a request with no loop around to observe it.
    fn apply_request_offline(&self) -> Result<(), RunnerError> {
        let Some(request) = self.take_request() else {
            return Ok(());
        };
        let state = RunnerState::load(self.store.as_ref())?;
        match (request, state) {
            (Request::Stop(reason), Some(mut state)) => {
                self.finish(&mut state, reason)?;
            }
            (Request::Stop(reason), None) => {
                debug!(reason = %reason, "Stop requested with no run in progress");
            }
            (Request::Pause, Some(mut state)) if state.phase.is_running() => {
                self.transition(&mut state, RunnerPhase::Paused)?;
                info!(run_id = %state.run_id, "Runner paused");
            }
            (Request::Pause, _) => {
                debug!("Pause requested with no active run");
            }
        }
        Ok(())
    }

    fn take_request(&self) -> Option<Request> {
        self.request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    fn has_request(&self) -> bool {
        self.request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn claim_loop(&self) -> bool {
        !self.loop_active.swap(true, Ordering::SeqCst)
    }

    /// Release the loop and apply any request that arrived while it was
    /// on its way out.
    fn release_loop(
        &self,
        result: Result<RunOutcome, RunnerError>,
    ) -> Result<RunOutcome, RunnerError> {
        self.loop_active.store(false, Ordering::SeqCst);
        if let Err(e) = self.apply_request_offline() {
            warn!(error = %e, "Applying late request failed");
        }
        result
    }

    fn session_verified(&self) -> Result<bool, RunnerError> {
        Ok(self.store.get(VERIFIED_KEY)?.as_deref() == Some("true"))
    }

    /// Wait before retrying after `err`: the queue's hint when it sent one.
    fn backoff(&self, err: &CadenceError) -> Duration {
        match err {
            CadenceError::RateLimited {
                retry_after_ms: Some(ms),
            } => Duration::from_millis(*ms),
            _ => self.config.fetch_cooldown(),
        }
    }

    /// Sleep that ends early when a pause or stop request arrives.
    async fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.has_request() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = self.wake.notified() => {}
            }
        }
    }
}

/// Queue report for an executor result. Structured output travels in the
/// `result` string next to the message.
fn report_for(result: &ActionResult) -> ActionReport {
    if !result.success {
        return ActionReport::failed(result.message.clone(), result.retryable);
    }
    match &result.output {
        Some(output) => ActionReport::completed(
            json!({ "message": result.message, "output": output }).to_string(),
        ),
        None => ActionReport::completed(result.message.clone()),
    }
}

fn report_message(report: &ActionReport) -> String {
    report
        .error
        .clone()
        .or_else(|| report.result.clone())
        .unwrap_or_default()
}
