//! Upload progress reporting for [`crate::client::DeskClient`].
//!
//! The server answers in a single response, so there is nothing real to
//! measure while a request is in flight. A [`ProgressTicker`] reports a
//! simulated percentage instead: +10 every tick, held at 90 until the
//! response arrives, then 100.
//!
//! The ticker is a tokio task owned by the request. It is aborted on
//! [`ProgressTicker::finish`], [`ProgressTicker::fail`] and on drop, so no
//! timer outlives the request it belongs to.
//!
//! # Example
//!
//! ```rust
//! use pdfdesk::UploadProgressCallback;
//! use std::sync::atomic::{AtomicU8, Ordering};
//!
//! struct LastPercent(AtomicU8);
//!
//! impl UploadProgressCallback for LastPercent {
//!     fn on_progress(&self, percent: u8) {
//!         self.0.store(percent, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::operation::Operation;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Interval between simulated progress steps.
pub const TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Shortest accepted tick interval; `tokio::time::interval` rejects zero.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Percentage added per tick.
pub const TICK_STEP: u8 = 10;

/// Highest percentage reported before the response arrives.
pub const TICK_CEILING: u8 = 90;

/// Receives upload events from the client.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_progress` is called from a tokio task.
pub trait UploadProgressCallback: Send + Sync {
    /// Called once, before the request is sent.
    fn on_submit(&self, operation: Operation, file_count: usize, total_bytes: u64) {
        let _ = (operation, file_count, total_bytes);
    }

    /// Called with a non-decreasing percentage in `0..=100`.
    fn on_progress(&self, percent: u8) {
        let _ = percent;
    }

    /// Called once when the payload has been received.
    fn on_complete(&self, operation: Operation, output_bytes: usize) {
        let _ = (operation, output_bytes);
    }

    /// Called once when the request failed.
    fn on_error(&self, operation: Operation, error: &str) {
        let _ = (operation, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl UploadProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn UploadProgressCallback>;

/// Next simulated percentage after `current`.
pub fn advance(current: u8) -> u8 {
    current.saturating_add(TICK_STEP).min(TICK_CEILING)
}

#[derive(Debug, Default)]
struct TickerState {
    percent: u8,
    done: bool,
}

/// Simulated progress for one in-flight request.
pub struct ProgressTicker {
    callback: ProgressCallback,
    state: Arc<Mutex<TickerState>>,
    task: JoinHandle<()>,
}

impl ProgressTicker {
    /// Report 0 and start ticking every `interval`.
    ///
    /// Intervals below [`MIN_TICK_INTERVAL`] are raised to it. Must be called
    /// within a tokio runtime.
    pub fn start(callback: ProgressCallback, interval: Duration) -> Self {
        let interval = interval.max(MIN_TICK_INTERVAL);
        let state = Arc::new(Mutex::new(TickerState::default()));
        callback.on_progress(0);

        let task = tokio::spawn({
            let callback = callback.clone();
            let state = state.clone();
            async move {
                let mut ticks = tokio::time::interval(interval);
                // The first tick completes immediately.
                ticks.tick().await;
                loop {
                    ticks.tick().await;
                    // Held across the callback so `finish` cannot slip a
                    // 100 in before a stale tick.
                    let mut guard = lock(&state);
                    if guard.done {
                        break;
                    }
                    guard.percent = advance(guard.percent);
                    callback.on_progress(guard.percent);
                    if guard.percent >= TICK_CEILING {
                        break;
                    }
                }
            }
        });

        Self {
            callback,
            state,
            task,
        }
    }

    /// Last reported percentage.
    pub fn percent(&self) -> u8 {
        lock(&self.state).percent
    }

    /// Whether the ticking task is still alive.
    pub fn is_ticking(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop ticking and report 100.
    pub fn finish(self) {
        self.task.abort();
        let mut guard = lock(&self.state);
        guard.done = true;
        guard.percent = 100;
        self.callback.on_progress(100);
    }

    /// Stop ticking without reporting completion.
    pub fn fail(self) {
        self.task.abort();
        lock(&self.state).done = true;
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn lock(state: &Mutex<TickerState>) -> MutexGuard<'_, TickerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
