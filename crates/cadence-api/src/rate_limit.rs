//! Sliding-window admission control for outbound platform calls.
//!
//! The window is a fixed ring of timestamps sized to `max_requests`, so
//! memory stays constant no matter how many calls a long session makes.
//! Entries older than the window are ignored when counting rather than
//! removed; they are overwritten as the ring wraps.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use cadence_core::config::RateLimitConfig;
use tracing::debug;

/// Ring buffer of call timestamps over a trailing window.
///
/// All methods take the current instant explicitly so the window can be
/// driven deterministically.
#[derive(Debug, Clone)]
pub struct RateWindow {
    slots: Box<[Option<Instant>]>,
    head: usize,
    count: usize,
    window: Duration,
}

impl RateWindow {
    /// A window admitting `max_requests` calls per `window`. A capacity of
    /// zero is raised to one so the limiter can always make progress.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let capacity = max_requests.max(1);
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            head: 0,
            count: 0,
            window,
        }
    }

    pub fn max_requests(&self) -> usize {
        self.slots.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of slots written so far, saturating at capacity.
    pub fn recorded(&self) -> usize {
        self.count
    }

    /// Number of recorded calls younger than the window at `now`.
    pub fn in_window_at(&self, now: Instant) -> usize {
        self.live(now).count()
    }

    pub fn can_proceed_at(&self, now: Instant) -> bool {
        self.in_window_at(now) < self.max_requests()
    }

    pub fn record_at(&mut self, now: Instant) {
        self.slots[self.head] = Some(now);
        self.head = (self.head + 1) % self.slots.len();
        self.count = (self.count + 1).min(self.slots.len());
    }

    /// How long until a call would be admitted: zero when one would be
    /// admitted now, else the time until the oldest in-window entry expires.
    pub fn time_until_slot_at(&self, now: Instant) -> Duration {
        if self.can_proceed_at(now) {
            return Duration::ZERO;
        }
        self.live(now)
            .min()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }

    fn live(&self, now: Instant) -> impl Iterator<Item = Instant> + '_ {
        self.slots
            .iter()
            .flatten()
            .copied()
            .filter(move |t| now.saturating_duration_since(*t) < self.window)
    }
}

/// Shared limiter used by every platform call path.
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<RateWindow>,
    max_wait_step: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration, max_wait_step: Duration) -> Self {
        Self {
            window: Mutex::new(RateWindow::new(max_requests, window)),
            max_wait_step,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window(), config.max_wait_step())
    }

    pub fn can_proceed(&self) -> bool {
        self.with_window(|w| w.can_proceed_at(Instant::now()))
    }

    pub fn record(&self) {
        self.with_window(|w| w.record_at(Instant::now()))
    }

    pub fn in_window(&self) -> usize {
        self.with_window(|w| w.in_window_at(Instant::now()))
    }

    pub fn time_until_slot(&self) -> Duration {
        self.with_window(|w| w.time_until_slot_at(Instant::now()))
    }

    /// Suspend until a call would be admitted. Each sleep is capped at
    /// `max_wait_step` and the wait is recomputed after it.
    pub async fn wait_for_slot(&self) {
        loop {
            let wait = self.time_until_slot();
            if wait.is_zero() {
                return;
            }
            self.pause(wait).await;
        }
    }

    /// Wait for a slot and claim it. The check and the record happen under
    /// one lock, so concurrent callers cannot claim the same slot.
    pub async fn acquire(&self) {
        loop {
            let wait = self.with_window(|w| {
                let now = Instant::now();
                if w.can_proceed_at(now) {
                    w.record_at(now);
                    Duration::ZERO
                } else {
                    w.time_until_slot_at(now)
                }
            });
            if wait.is_zero() {
                return;
            }
            self.pause(wait).await;
        }
    }

    async fn pause(&self, wait: Duration) {
        let step = wait.min(self.max_wait_step).max(Duration::from_millis(1));
        debug!(wait_ms = wait.as_millis() as u64, "Rate window full, waiting");
        tokio::time::sleep(step).await;
    }

    fn with_window<T>(&self, f: impl FnOnce(&mut RateWindow) -> T) -> T {
        // Poisoning leaves the ring structurally valid.
        let mut guard = self.window.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}
