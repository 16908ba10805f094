//! Delayed busy indicator.
//!
//! Work raises the indicator with [`BusyIndicator::enter`] and lowers it by
//! dropping the returned guard. The callback only sees `true` once the
//! indicator has stayed raised for the configured delay, so short passes
//! never flicker a spinner.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

pub type BusyCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Clone)]
pub struct BusyIndicator {
    inner: Arc<BusyInner>,
}

struct BusyInner {
    delay: Duration,
    callback: BusyCallback,
    state: Mutex<BusyState>,
}

#[derive(Default)]
struct BusyState {
    count: usize,
    visible: bool,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for BusyIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusyIndicator")
            .field("delay", &self.inner.delay)
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl BusyIndicator {
    pub fn new(delay: Duration, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(BusyInner {
                delay,
                callback: Arc::new(callback),
                state: Mutex::new(BusyState::default()),
            }),
        }
    }

    /// An indicator nobody watches.
    pub fn silent() -> Self {
        Self::new(Duration::ZERO, |_| {})
    }

    /// Raise the indicator until the guard drops. Nested calls stack.
    ///
    /// Must be called from within a tokio runtime when the delay is non-zero.
    pub fn enter(&self) -> BusyGuard {
        let mut state = self.inner.lock();
        state.count += 1;
        if state.count == 1 {
            state.epoch += 1;
            if self.inner.delay.is_zero() {
                state.visible = true;
                drop(state);
                (self.inner.callback)(true);
            } else {
                let epoch = state.epoch;
                let inner = Arc::clone(&self.inner);
                state.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(inner.delay).await;
                    inner.show(epoch);
                }));
            }
        }
        BusyGuard {
            indicator: self.clone(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().count > 0
    }

    /// Whether the callback has been told to show the indicator.
    pub fn is_visible(&self) -> bool {
        self.inner.lock().visible
    }

    fn leave(&self) {
        let mut state = self.inner.lock();
        state.count = state.count.saturating_sub(1);
        if state.count > 0 {
            return;
        }
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.visible {
            state.visible = false;
            drop(state);
            (self.inner.callback)(false);
        }
    }
}

impl BusyInner {
    fn lock(&self) -> MutexGuard<'_, BusyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show(&self, epoch: u64) {
        let mut state = self.lock();
        if state.count == 0 || state.epoch != epoch || state.visible {
            return;
        }
        state.visible = true;
        state.timer = None;
        drop(state);
        (self.callback)(true);
    }
}

/// Lowers the indicator on drop.
#[must_use = "the indicator drops as soon as the guard does"]
pub struct BusyGuard {
    indicator: BusyIndicator,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.indicator.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recording(delay: Duration) -> (BusyIndicator, Arc<StdMutex<Vec<bool>>>) {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let busy = BusyIndicator::new(delay, move |on| sink.lock().unwrap().push(on));
        (busy, log)
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_work_never_shows() {
        let (busy, log) = recording(Duration::from_millis(750));
        {
            let _guard = busy.enter();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(log.lock().unwrap().is_empty());
        assert!(!busy.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_work_shows_then_hides() {
        let (busy, log) = recording(Duration::from_millis(750));
        let guard = busy.enter();
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(busy.is_visible());
        drop(guard);
        assert_eq!(*log.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_guards() {
        let (busy, log) = recording(Duration::ZERO);
        let outer = busy.enter();
        let inner = busy.enter();
        drop(inner);
        assert!(busy.is_busy());
        drop(outer);
        assert!(!busy.is_busy());
        assert_eq!(*log.lock().unwrap(), vec![true, false]);
    }
}
