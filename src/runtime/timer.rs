//! Timer collaborator: single-fire delayed callbacks with best-effort cancel.
//!
//! The scheduler never sleeps itself; it asks a [`TimerService`] to invoke a
//! callback once after a delay. Callbacks must be cheap and non-blocking (the
//! scheduler's own callbacks only check a generation token and submit work to
//! the executor), because they may run on a shared dispatch context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Callback invoked when a timer fires.
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque handle to a scheduled-but-not-yet-fired timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Create a handle from an implementation-assigned id.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get the implementation-assigned id.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// A facility that invokes a callback once after a delay, asynchronously.
///
/// Contract:
/// - `schedule` never blocks the caller and never runs the callback inline;
/// - each scheduled callback fires at most once;
/// - `cancel` is best-effort: it returns `false` if the timer already fired
///   (or was cancelled before), and a `true` return means the callback will
///   not run.
pub trait TimerService: Send + Sync {
    /// Schedule `callback` to run once after `delay`.
    fn schedule(&self, label: &str, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Attempt to cancel a scheduled timer. Best-effort; see trait docs.
    fn cancel(&self, handle: &TimerHandle) -> bool;
}

/// Production [`TimerService`] backed by spawned `tokio::time::sleep` tasks.
///
/// Cancellation and firing race for a per-timer claim under a lock, so a
/// successful `cancel` guarantees the callback does not run.
pub struct TokioTimer {
    handle: Handle,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
}

impl TokioTimer {
    /// Create a timer bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime; use [`TokioTimer::with_handle`] there.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a timer bound to an explicit runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of timers scheduled but not yet fired or cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("timer registry lock poisoned").len()
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for TokioTimer {
    fn schedule(&self, label: &str, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = label.to_string();
        tracing::trace!(timer = %label, id, delay_ms = delay.as_millis() as u64, "scheduling timer");

        let pending = Arc::clone(&self.pending);
        // Holding the registry lock across the spawn keeps the task's claim
        // from racing ahead of the insert.
        let mut registry = self.pending.lock().expect("timer registry lock poisoned");
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // Claim the registry entry; losing the claim means a concurrent
            // cancel won, and the callback must not run.
            let claimed = pending
                .lock()
                .expect("timer registry lock poisoned")
                .remove(&id)
                .is_some();
            if claimed {
                tracing::trace!(timer = %label, id, "timer fired");
                callback();
            }
        });

        registry.insert(id, task);
        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: &TimerHandle) -> bool {
        let claimed = self
            .pending
            .lock()
            .expect("timer registry lock poisoned")
            .remove(&handle.as_raw());
        match claimed {
            Some(task) => {
                task.abort();
                tracing::trace!(id = handle.as_raw(), "timer cancelled");
                true
            }
            None => false,
        }
    }
}
