//! Runner lifecycle tests against a scripted queue, host and executors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use cadence_action::{
    same_page, ActionError, ActionExecutor, ActionKind, ActionResult, ElementHandle,
    ExecutorRegistry, Host,
};
use cadence_api::{ActionReport, NextAction, QueueClient, VerifyResponse};
use cadence_core::config::RunnerConfig;
use cadence_core::error::{CadenceError, Result as CadenceResult};
use cadence_core::events::{Notifier, RunnerEvent};
use cadence_core::types::{
    AccountIdentity, ActionId, ActionStatus, Locator, ProspectRef, RunnerPhase, ScheduledAction,
};
use cadence_runner::{
    PendingReport, RunOutcome, Runner, RunnerDeps, RunnerError, RunnerState,
    REASON_AUTH_EXPIRED, REASON_COMPLETED, REASON_DAILY_LIMIT, REASON_VERIFY_FAILED,
};
use cadence_storage::{MemoryStateStore, StateStore};

const TARGET: &str = "https://platform.example.com/in/ada";
const FEED: &str = "https://platform.example.com/feed/";

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct ScriptedQueue {
    polls: Mutex<VecDeque<CadenceResult<NextAction>>>,
    poll_count: AtomicUsize,
    reports: Mutex<Vec<(ActionId, ActionReport)>>,
    report_calls: AtomicUsize,
    failing_reports: AtomicUsize,
    throttled_reports: AtomicUsize,
    verify_calls: AtomicUsize,
    reject_account: bool,
}

impl ScriptedQueue {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            reject_account: true,
            ..Self::default()
        })
    }

    fn push(&self, reply: CadenceResult<NextAction>) {
        self.polls.lock().unwrap().push_back(reply);
    }

    fn push_action(&self, action: ScheduledAction) {
        self.push(Ok(NextAction::with_action(action, 10)));
    }

    fn fail_next_reports(&self, n: usize) {
        self.failing_reports.store(n, Ordering::SeqCst);
    }

    fn throttle_next_reports(&self, n: usize) {
        self.throttled_reports.store(n, Ordering::SeqCst);
    }

    fn reports(&self) -> Vec<(ActionId, ActionReport)> {
        self.reports.lock().unwrap().clone()
    }

    fn polls(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueClient for ScriptedQueue {
    async fn next_action(&self) -> CadenceResult<NextAction> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(NextAction::empty()))
    }

    async fn complete_action(&self, id: &ActionId, report: &ActionReport) -> CadenceResult<()> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        let throttled = self.throttled_reports.load(Ordering::SeqCst);
        if throttled > 0 {
            self.throttled_reports.store(throttled - 1, Ordering::SeqCst);
            return Err(CadenceError::RateLimited {
                retry_after_ms: Some(1),
            });
        }
        let failing = self.failing_reports.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_reports.store(failing - 1, Ordering::SeqCst);
            return Err(CadenceError::TransientNetwork("connection reset".into()));
        }
        self.reports
            .lock()
            .unwrap()
            .push((id.clone(), report.clone()));
        Ok(())
    }

    async fn verify_account(&self, _identity: &AccountIdentity) -> CadenceResult<VerifyResponse> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(VerifyResponse {
            success: true,
            verified: !self.reject_account,
            account_info: None,
        })
    }
}

/// Host that only tracks its URL. A "stuck" host ignores navigation.
struct FakeHost {
    url: Mutex<String>,
    navigations: Mutex<Vec<String>>,
    stuck: bool,
}

impl FakeHost {
    fn at(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new(url.to_string()),
            navigations: Mutex::new(Vec::new()),
            stuck: false,
        })
    }

    fn stuck_at(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Mutex::new(url.to_string()),
            navigations: Mutex::new(Vec::new()),
            stuck: true,
        })
    }

    fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Host for FakeHost {
    async fn current_url(&self) -> Result<String, ActionError> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn navigate(&self, url: &str) -> Result<(), ActionError> {
        self.navigations.lock().unwrap().push(url.to_string());
        if !self.stuck {
            *self.url.lock().unwrap() = url.to_string();
        }
        Ok(())
    }

    async fn locate(&self, _locator: &Locator) -> Result<Option<ElementHandle>, ActionError> {
        Ok(None)
    }

    async fn click(&self, _element: &ElementHandle) -> Result<(), ActionError> {
        Ok(())
    }

    async fn set_text(&self, _element: &ElementHandle, _text: &str) -> Result<(), ActionError> {
        Ok(())
    }

    async fn dispatch_change(&self, _element: &ElementHandle) -> Result<(), ActionError> {
        Ok(())
    }

    async fn read_text(&self, _element: &ElementHandle) -> Result<Option<String>, ActionError> {
        Ok(None)
    }

    async fn account_identity(&self) -> Result<Option<AccountIdentity>, ActionError> {
        Ok(Some(AccountIdentity {
            profile_url: "https://platform.example.com/in/me".into(),
            name: Some("Me".into()),
        }))
    }
}

/// Asks for a context switch until the host is on the target, then
/// succeeds.
struct PositionalExecutor {
    kind: ActionKind,
    calls: AtomicUsize,
}

impl PositionalExecutor {
    fn new(kind: ActionKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionExecutor for PositionalExecutor {
    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn execute(
        &self,
        host: &dyn Host,
        action: &ScheduledAction,
    ) -> Result<ActionResult, ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !same_page(&host.current_url().await?, &action.target.profile_url) {
            return Ok(ActionResult::context_switch(&action.target.profile_url));
        }
        Ok(ActionResult::success("Followed"))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn fast_config() -> RunnerConfig {
    RunnerConfig {
        min_delay_ms: 1,
        max_delay_ms: 2,
        fetch_cooldown_ms: 5,
        idle_poll_ms: 1,
        empty_poll_limit: 3,
        max_context_switches: 3,
        report_attempts: 3,
    }
}

fn action(id: &str, action_type: &str) -> ScheduledAction {
    ScheduledAction {
        id: ActionId::new(id),
        action_type: action_type.to_string(),
        target: ProspectRef {
            id: None,
            profile_url: TARGET.to_string(),
            name: Some("Ada Lovelace".to_string()),
        },
        payload: json!({}),
        scheduled_for: None,
        status: ActionStatus::Pending,
        retry_count: 0,
    }
}

struct Harness {
    store: MemoryStateStore,
    queue: Arc<ScriptedQueue>,
    host: Arc<FakeHost>,
    executor: Arc<PositionalExecutor>,
    notifier: Notifier,
}

impl Harness {
    fn new(queue: Arc<ScriptedQueue>, host: Arc<FakeHost>) -> Self {
        Self {
            store: MemoryStateStore::new(),
            queue,
            host,
            executor: PositionalExecutor::new(ActionKind::Follow),
            notifier: Notifier::default(),
        }
    }

    /// A runner over the shared session: building a second one models a
    /// fresh execution context.
    fn runner(&self, config: RunnerConfig) -> Runner {
        let mut registry = ExecutorRegistry::new();
        registry.register(self.executor.clone());
        Runner::new(
            RunnerDeps {
                store: Arc::new(self.store.clone()),
                queue: self.queue.clone(),
                registry: Arc::new(registry),
                host: self.host.clone(),
                notifier: self.notifier.clone(),
            },
            config,
        )
    }

    fn persisted(&self) -> Option<RunnerState> {
        RunnerState::load(&self.store).unwrap()
    }
}

async fn wait_for_phase(
    rx: &mut tokio::sync::broadcast::Receiver<RunnerEvent>,
    phase: RunnerPhase,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(RunnerEvent::PhaseChanged { phase: p }) = rx.recv().await {
                if p == phase {
                    return;
                }
            }
        }
    })
    .await
    .expect("phase never reached");
}

// =============================================================================
// Stop conditions
// =============================================================================

#[tokio::test]
async fn test_three_empty_polls_complete_the_run() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let runner = h.runner(fast_config());

    let outcome = runner.start().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_COMPLETED.into()
        }
    );
    assert_eq!(h.queue.polls(), 3);
    assert!(h.persisted().is_none());
    assert_eq!(
        runner.status().unwrap().phase,
        RunnerPhase::stopped(REASON_COMPLETED)
    );
}

#[tokio::test]
async fn test_exhausted_quota_stops_without_executing() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue
        .push(Ok(NextAction::with_action(action("a1", "follow"), 0)));
    let runner = h.runner(fast_config());

    let outcome = runner.start().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_DAILY_LIMIT.into()
        }
    );
    assert_eq!(h.executor.calls(), 0);
    assert!(h.queue.reports().is_empty());
}

#[tokio::test]
async fn test_auth_expired_stops_the_run() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue.push(Err(CadenceError::AuthExpired));
    let runner = h.runner(fast_config());

    let outcome = runner.start().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_AUTH_EXPIRED.into()
        }
    );
    assert_eq!(h.queue.polls(), 1);
}

#[tokio::test]
async fn test_fetch_error_cools_down_and_continues() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue
        .push(Err(CadenceError::TransientNetwork("timeout".into())));
    h.queue.push_action(action("a1", "follow"));
    let runner = h.runner(fast_config());

    let outcome = runner.start().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_COMPLETED.into()
        }
    );
    // error, action, then three empty polls
    assert_eq!(h.queue.polls(), 5);
    assert_eq!(h.queue.reports().len(), 1);
}

// =============================================================================
// Verification
// =============================================================================

#[tokio::test]
async fn test_rejected_account_never_polls() {
    let h = Harness::new(ScriptedQueue::rejecting(), FakeHost::at(TARGET));
    let runner = h.runner(fast_config());

    let outcome = runner.start().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_VERIFY_FAILED.into()
        }
    );
    assert_eq!(h.queue.polls(), 0);
    assert!(!runner.status().unwrap().verified);
}

#[tokio::test]
async fn test_account_verified_once_per_session() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));

    h.runner(fast_config()).start().await.unwrap();
    h.runner(fast_config()).start().await.unwrap();

    assert_eq!(h.queue.verify_calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Execution and reporting
// =============================================================================

#[tokio::test]
async fn test_unknown_action_type_reported_as_permanent_failure() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue.push_action(action("a1", "foo"));
    let runner = h.runner(fast_config());

    runner.start().await.unwrap();

    let reports = h.queue.reports();
    assert_eq!(reports.len(), 1);
    let (id, report) = &reports[0];
    assert_eq!(id, &ActionId::new("a1"));
    assert_eq!(report.status, ActionStatus::Failed);
    assert_eq!(report.error.as_deref(), Some("Unknown action type: foo"));
    assert!(!report.retry);
}

#[tokio::test]
async fn test_successful_action_is_reported_and_announced() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue.push_action(action("a1", "follow"));
    let mut rx = h.notifier.subscribe();
    let runner = h.runner(fast_config());

    runner.start().await.unwrap();

    let reports = h.queue.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].1.is_success());
    assert_eq!(reports[0].1.result.as_deref(), Some("Followed"));

    let mut finished = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let RunnerEvent::ActionFinished {
            action_id, success, ..
        } = event
        {
            finished.push((action_id, success));
        }
    }
    assert_eq!(finished, vec![(ActionId::new("a1"), true)]);
}

#[tokio::test]
async fn test_report_retried_after_transient_failures() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue.push_action(action("a1", "follow"));
    h.queue.fail_next_reports(2);
    let runner = h.runner(fast_config());

    runner.start().await.unwrap();

    assert_eq!(h.queue.report_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.queue.reports().len(), 1);
}

#[tokio::test]
async fn test_report_retry_honours_rate_limit_hint() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue.push_action(action("a1", "follow"));
    h.queue.throttle_next_reports(2);
    // A fixed cooldown this long would blow the timeout below.
    let runner = h.runner(RunnerConfig {
        fetch_cooldown_ms: 60_000,
        ..fast_config()
    });

    tokio::time::timeout(Duration::from_secs(5), runner.start())
        .await
        .expect("report retries waited the full cooldown")
        .unwrap();

    assert_eq!(h.queue.report_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.queue.reports().len(), 1);
}

#[tokio::test]
async fn test_report_dropped_after_last_attempt() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    h.queue.push_action(action("a1", "follow"));
    h.queue.fail_next_reports(5);
    let runner = h.runner(fast_config());

    let outcome = runner.start().await.unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_COMPLETED.into()
        }
    );
    assert_eq!(h.queue.report_calls.load(Ordering::SeqCst), 3);
    assert!(h.queue.reports().is_empty());
}

// =============================================================================
// Context switches and resumption
// =============================================================================

#[tokio::test]
async fn test_context_switch_then_resume_in_fresh_context() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(FEED));
    h.queue.push_action(action("a1", "follow"));

    let outcome = h.runner(fast_config()).start().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::ContextSwitch {
            action_id: ActionId::new("a1"),
            url: TARGET.into()
        }
    );
    assert_eq!(h.host.navigations(), vec![TARGET.to_string()]);
    let state = h.persisted().unwrap();
    assert_eq!(state.phase, RunnerPhase::Executing);
    assert_eq!(state.current_action.unwrap().id, ActionId::new("a1"));
    assert!(h.queue.reports().is_empty());

    let outcome = h.runner(fast_config()).resume_after_teardown().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_COMPLETED.into()
        }
    );
    assert_eq!(h.executor.calls(), 2);
    assert_eq!(h.queue.reports().len(), 1);
    assert_eq!(h.queue.verify_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_context_switch_ceiling_fails_action_as_retryable() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::stuck_at(FEED));
    h.queue.push_action(action("a1", "follow"));

    let mut outcome = h.runner(fast_config()).start().await.unwrap();
    let mut switches = 0;
    while matches!(outcome, RunOutcome::ContextSwitch { .. }) {
        switches += 1;
        outcome = h.runner(fast_config()).resume_after_teardown().await.unwrap();
    }

    assert_eq!(switches, 3);
    let reports = h.queue.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].1.status, ActionStatus::Failed);
    assert_eq!(
        reports[0].1.error.as_deref(),
        Some("Gave up after 4 context switches")
    );
    assert!(reports[0].1.retry);
}

#[tokio::test]
async fn test_resume_twice_reports_once() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let mut state = RunnerState::new();
    state.phase = RunnerPhase::Executing;
    state.current_action = Some(action("a1", "follow"));
    state.save(&h.store).unwrap();
    let runner = h.runner(fast_config());

    let first = runner.resume_after_teardown().await.unwrap();
    let second = runner.resume_after_teardown().await.unwrap();

    assert_eq!(
        first,
        RunOutcome::Stopped {
            reason: REASON_COMPLETED.into()
        }
    );
    assert_eq!(second, RunOutcome::Idle);
    assert_eq!(h.executor.calls(), 1);
    assert_eq!(h.queue.reports().len(), 1);
}

#[tokio::test]
async fn test_concurrent_resume_runs_one_loop() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let mut state = RunnerState::new();
    state.phase = RunnerPhase::Executing;
    state.current_action = Some(action("a1", "follow"));
    state.save(&h.store).unwrap();
    let runner = h.runner(fast_config());

    let (a, b) = tokio::join!(runner.resume_after_teardown(), runner.resume_after_teardown());
    let outcomes = [a.unwrap(), b.unwrap()];

    assert!(outcomes.contains(&RunOutcome::AlreadyRunning));
    assert_eq!(h.executor.calls(), 1);
    assert_eq!(h.queue.reports().len(), 1);
}

#[tokio::test]
async fn test_pending_report_resent_without_reexecution() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let mut state = RunnerState::new();
    state.phase = RunnerPhase::Executing;
    state.pending_report = Some(PendingReport {
        action_id: ActionId::new("a1"),
        report: ActionReport::completed("Followed"),
    });
    state.save(&h.store).unwrap();

    h.runner(fast_config()).resume_after_teardown().await.unwrap();

    assert_eq!(h.executor.calls(), 0);
    assert_eq!(h.queue.reports().len(), 1);
}

#[tokio::test]
async fn test_start_is_noop_while_run_persisted_as_active() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let mut state = RunnerState::new();
    state.phase = RunnerPhase::Waiting;
    state.save(&h.store).unwrap();

    let outcome = h.runner(fast_config()).start().await.unwrap();

    assert_eq!(outcome, RunOutcome::AlreadyRunning);
    assert_eq!(h.queue.polls(), 0);
}

// =============================================================================
// Pause and stop
// =============================================================================

fn slow_idle_config() -> RunnerConfig {
    RunnerConfig {
        idle_poll_ms: 60_000,
        ..fast_config()
    }
}

#[tokio::test]
async fn test_stop_interrupts_waiting() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let mut rx = h.notifier.subscribe();
    let runner = Arc::new(h.runner(slow_idle_config()));

    let task = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.start().await }
    });
    wait_for_phase(&mut rx, RunnerPhase::Waiting).await;
    runner.stop("stopped by user").unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: "stopped by user".into()
        }
    );
    assert!(h.persisted().is_none());
}

#[tokio::test]
async fn test_pause_then_resume() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let mut rx = h.notifier.subscribe();
    let runner = Arc::new(h.runner(slow_idle_config()));

    let task = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { runner.start().await }
    });
    wait_for_phase(&mut rx, RunnerPhase::Waiting).await;
    runner.pause().unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, RunOutcome::Paused);
    assert_eq!(runner.status().unwrap().phase, RunnerPhase::Paused);

    h.queue
        .push(Ok(NextAction::with_action(action("a1", "follow"), 0)));
    let outcome = runner.resume().await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Stopped {
            reason: REASON_DAILY_LIMIT.into()
        }
    );
}

#[tokio::test]
async fn test_resume_requires_paused_run() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::at(TARGET));
    let err = h.runner(fast_config()).resume().await.unwrap_err();
    assert!(matches!(err, RunnerError::NotPaused(RunnerPhase::Init)));
}

#[tokio::test]
async fn test_stop_without_live_loop_clears_persisted_run() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::stuck_at(FEED));
    h.queue.push_action(action("a1", "follow"));
    let runner = h.runner(fast_config());

    let outcome = runner.start().await.unwrap();
    assert!(matches!(outcome, RunOutcome::ContextSwitch { .. }));

    runner.stop("stopped by user").unwrap();

    assert!(h.persisted().is_none());
    assert_eq!(
        runner.status().unwrap().phase,
        RunnerPhase::stopped("stopped by user")
    );
    let resumed = h.runner(fast_config()).resume_after_teardown().await.unwrap();
    assert_eq!(resumed, RunOutcome::Idle);
    assert!(h.queue.reports().is_empty());
}

#[tokio::test]
async fn test_status_reports_current_action() {
    let h = Harness::new(ScriptedQueue::new(), FakeHost::stuck_at(FEED));
    h.queue.push_action(action("a1", "follow"));
    let runner = h.runner(fast_config());

    runner.start().await.unwrap();

    let status = runner.status().unwrap();
    assert_eq!(status.phase, RunnerPhase::Executing);
    assert_eq!(status.current_action, Some(ActionId::new("a1")));
    assert!(status.verified);
    assert_eq!(status.stats.unwrap().context_switches, 1);
    assert!(h.store.get("cadence.session.verified").unwrap().is_some());
}
