//! Debounced, staleness-driven task runner.
//!
//! A [`DebouncedRunner`] polls its task on a fixed cadence. A pass starts when
//! the runner has been marked stale or the task's own predicate asks for one.
//! Passes never overlap: the poll loop skips a tick while a pass is active,
//! and [`DebouncedRunner::run_now`] waits for the active pass to finish
//! before starting its own. Edits that arrive mid-pass are picked up right
//! after it settles rather than a full interval later.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use smol_str::SmolStr;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::busy::BusyIndicator;
use crate::error::PreviewError;

/// Outcome of one pass: an optional status line for the log.
pub type RunResult = Result<Option<String>, PreviewError>;

pub type ErrorHandler = Arc<dyn Fn(&PreviewError) + Send + Sync>;

/// Work driven by a [`DebouncedRunner`].
pub trait RunnerTask: Send + Sync + 'static {
    /// Checked on every poll tick while the runner is not stale.
    fn should_run(&self) -> bool {
        false
    }

    /// Execute one pass. `round` increases by one per pass.
    fn run(&self, round: u64) -> BoxFuture<'_, RunResult>;
}

/// Snapshot of a runner's scheduling state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerState {
    pub stale: bool,
    pub paused: bool,
    pub last_run: Option<Instant>,
    pub min_interval: Duration,
    /// Round of the most recently started pass; 0 before the first.
    pub round: u64,
}

/// Shortest poll cadence a runner accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct RunnerConfig {
    pub name: SmolStr,
    pub min_interval: Duration,
    pub busy: BusyIndicator,
    pub on_error: ErrorHandler,
    /// Start paused.
    pub paused: bool,
}

impl RunnerConfig {
    pub fn new(name: impl Into<SmolStr>, min_interval: Duration) -> Self {
        Self {
            name: name.into(),
            min_interval: min_interval.max(MIN_POLL_INTERVAL),
            busy: BusyIndicator::silent(),
            on_error: Arc::new(|_| {}),
            paused: false,
        }
    }

    pub fn busy(mut self, busy: BusyIndicator) -> Self {
        self.busy = busy;
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&PreviewError) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(handler);
        self
    }

    pub fn paused(mut self, paused: bool) -> Self {
        self.paused = paused;
        self
    }
}

struct RunnerInner {
    name: SmolStr,
    task: Arc<dyn RunnerTask>,
    state: Mutex<RunnerState>,
    /// Held for the duration of a pass.
    active: tokio::sync::Mutex<()>,
    wake: Notify,
    busy: BusyIndicator,
    on_error: ErrorHandler,
}

pub struct DebouncedRunner {
    inner: Arc<RunnerInner>,
    poll: JoinHandle<()>,
}

impl std::fmt::Debug for DebouncedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedRunner")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

impl DebouncedRunner {
    /// Start polling `task`. Must be called from within a tokio runtime.
    pub fn new(task: Arc<dyn RunnerTask>, config: RunnerConfig) -> Self {
        let inner = Arc::new(RunnerInner {
            name: config.name,
            task,
            state: Mutex::new(RunnerState {
                stale: false,
                paused: config.paused,
                last_run: None,
                min_interval: config.min_interval,
                round: 0,
            }),
            active: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            busy: config.busy,
            on_error: config.on_error,
        });
        let poll = tokio::spawn(poll_loop(Arc::clone(&inner)));
        Self { inner, poll }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> RunnerState {
        self.inner.state().clone()
    }

    pub fn round(&self) -> u64 {
        self.inner.state().round
    }

    /// Whether a pass is in flight.
    pub fn is_running(&self) -> bool {
        self.inner.active.try_lock().is_err()
    }

    /// Mark pending work. Picked up on the next poll tick.
    pub fn set_stale(&self) {
        self.inner.set_stale();
    }

    pub fn pause(&self) {
        self.inner.state().paused = true;
        tracing::debug!(runner = %self.inner.name, "paused");
    }

    /// Resume polling, optionally with a new interval.
    pub fn resume(&self, interval: Option<Duration>) {
        {
            let mut state = self.inner.state();
            state.paused = false;
            if let Some(interval) = interval {
                state.min_interval = interval.max(MIN_POLL_INTERVAL);
            }
        }
        tracing::debug!(runner = %self.inner.name, "resumed");
        self.inner.wake.notify_one();
    }

    /// Run a pass now, bypassing the debounce and the pause flag. Waits for
    /// an in-flight pass first. Returns the round that ran.
    pub async fn run_now(&self) -> u64 {
        self.inner.force().await
    }

    /// A weak handle for tasks that need to poke this runner.
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Stop the poll loop. An in-flight pass is dropped at its next await.
    pub fn shutdown(&self) {
        self.poll.abort();
    }
}

impl Drop for DebouncedRunner {
    fn drop(&mut self) {
        self.poll.abort();
    }
}

/// Weak reference to a runner. Operations are no-ops once it is gone.
#[derive(Clone)]
pub struct RunnerHandle {
    inner: Weak<RunnerInner>,
}

impl RunnerHandle {
    pub fn set_stale(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set_stale();
        }
    }

    pub async fn run_now(&self) -> Option<u64> {
        let inner = self.inner.upgrade()?;
        Some(inner.force().await)
    }

    pub fn is_stale(&self) -> bool {
        self.inner.upgrade().is_some_and(|inner| inner.state().stale)
    }
}

async fn poll_loop(inner: Arc<RunnerInner>) {
    loop {
        let interval = inner.state().min_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = inner.wake.notified() => {}
        }
        inner.poll().await;
    }
}

impl RunnerInner {
    fn state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_stale(&self) {
        self.state().stale = true;
    }

    fn is_due(&self) -> bool {
        {
            let state = self.state();
            if state.paused {
                return false;
            }
            if state.stale {
                return true;
            }
        }
        self.task.should_run()
    }

    async fn poll(&self) {
        let Ok(active) = self.active.try_lock() else {
            return;
        };
        if !self.is_due() {
            return;
        }
        self.execute(active).await;
    }

    async fn force(&self) -> u64 {
        let active = self.active.lock().await;
        self.execute(active).await
    }

    async fn execute(&self, active: tokio::sync::MutexGuard<'_, ()>) -> u64 {
        let round = {
            let mut state = self.state();
            state.stale = false;
            state.round += 1;
            state.last_run = Some(Instant::now());
            state.round
        };

        let busy = self.busy.enter();
        let started = Instant::now();
        let result = AssertUnwindSafe(self.task.run(round)).catch_unwind().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        drop(busy);

        metrics::counter!("preview_runner_passes_total", "runner" => self.name.to_string())
            .increment(1);
        metrics::histogram!("preview_runner_pass_ms", "runner" => self.name.to_string())
            .record(elapsed_ms as f64);

        let result = result.unwrap_or_else(|panic| {
            Err(PreviewError::Panicked {
                message: panic_message(panic.as_ref()),
            })
        });
        match result {
            Ok(Some(status)) => tracing::debug!(runner = %self.name, round, elapsed_ms, "{status}"),
            Ok(None) => tracing::trace!(runner = %self.name, round, elapsed_ms, "pass done"),
            Err(e) => {
                tracing::warn!(runner = %self.name, round, error = %e, "pass failed");
                (self.on_error)(&e);
            }
        }
        drop(active);

        if self.is_due() {
            self.wake.notify_one();
        }
        round
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
