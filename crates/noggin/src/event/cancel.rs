//! Shared cancellation token
//!
//! Cancellation is level-triggered: any number of concurrent `cancel` calls
//! collapse to the same effect, and cooperating tasks poll the flag at their
//! next check point. Long waits are sliced so cancellation latency is
//! bounded by the slice size, not the wait duration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Cloneable cancellation token shared across session tasks
///
/// Clones observe the same underlying state. The generation counter ticks on
/// every `cancel`, letting diagnostics distinguish one cancellation from the
/// next even after a `reset`.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    generation: AtomicU64,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Check whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag ahead of a new session
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Number of cancellations requested over this token's lifetime
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Sleep for `total`, checking for cancellation every `slice`
    ///
    /// Returns `true` when the full duration elapsed, `false` when the sleep
    /// was cut short by cancellation.
    pub fn sleep_while(&self, total: Duration, slice: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return true;
            };
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(slice.max(Duration::from_millis(1))));
        }
    }
}
