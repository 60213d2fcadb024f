//! Testing utilities for users of the snooze library.
//!
//! This module provides deterministic collaborator doubles:
//!
//! - [`ManualTimer`]: a [`TimerService`] whose timers fire only when the test
//!   says so, with optional forced cancel failure for stale-timer races
//! - [`QueueExecutor`]: a [`TaskExecutor`] that queues submissions for the
//!   test to drive
//! - [`CountingJob`]: a [`BackgroundJob`] that records starts and finishes,
//!   detects overlapping invocations, and can be gated, failing, or
//!   cancel-aware

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::job::{BackgroundJob, JobError};
use crate::core::types::JobPriority;
use crate::runtime::executor::{TaskExecutor, TaskFuture};
use crate::runtime::timer::{TimerCallback, TimerHandle, TimerService};

struct PendingTimer {
    id: u64,
    label: String,
    delay: Duration,
    callback: TimerCallback,
}

struct ManualTimerState {
    next_id: u64,
    pending: VecDeque<PendingTimer>,
}

/// A [`TimerService`] driven by hand.
///
/// Scheduled timers queue up in order and fire only on [`fire_next`]
/// (oldest first). With [`set_cancel_fails`] enabled, `cancel` reports
/// failure and leaves the entry queued, simulating a timer that already
/// fired on its dispatch context.
///
/// [`fire_next`]: ManualTimer::fire_next
/// [`set_cancel_fails`]: ManualTimer::set_cancel_fails
pub struct ManualTimer {
    state: Mutex<ManualTimerState>,
    cancel_fails: AtomicBool,
}

impl ManualTimer {
    /// Create a manual timer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ManualTimerState {
                next_id: 1,
                pending: VecDeque::new(),
            }),
            cancel_fails: AtomicBool::new(false),
        })
    }

    /// While `true`, every `cancel` fails and leaves its timer queued.
    pub fn set_cancel_fails(&self, fails: bool) {
        self.cancel_fails.store(fails, Ordering::SeqCst);
    }

    /// Number of scheduled timers not yet fired or cancelled.
    pub fn pending_count(&self) -> usize {
        self.state.lock().expect("manual timer lock poisoned").pending.len()
    }

    /// Labels of the queued timers, oldest first.
    pub fn pending_labels(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("manual timer lock poisoned")
            .pending
            .iter()
            .map(|timer| timer.label.clone())
            .collect()
    }

    /// Delay of the most recently scheduled timer.
    pub fn last_delay(&self) -> Option<Duration> {
        self.state
            .lock()
            .expect("manual timer lock poisoned")
            .pending
            .back()
            .map(|timer| timer.delay)
    }

    /// Fire the oldest queued timer. Returns `false` if none is queued.
    ///
    /// The callback runs on the calling thread, outside the timer's own lock.
    pub fn fire_next(&self) -> bool {
        let entry = self
            .state
            .lock()
            .expect("manual timer lock poisoned")
            .pending
            .pop_front();
        match entry {
            Some(timer) => {
                (timer.callback)();
                true
            }
            None => false,
        }
    }

    /// Fire queued timers until none remain (including ones scheduled by the
    /// callbacks themselves).
    pub fn fire_all(&self) {
        while self.fire_next() {}
    }
}

impl TimerService for ManualTimer {
    fn schedule(&self, label: &str, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let mut state = self.state.lock().expect("manual timer lock poisoned");
        let id = state.next_id;
        state.next_id += 1;
        state.pending.push_back(PendingTimer {
            id,
            label: label.to_string(),
            delay,
            callback,
        });
        TimerHandle::from_raw(id)
    }

    fn cancel(&self, handle: &TimerHandle) -> bool {
        if self.cancel_fails.load(Ordering::SeqCst) {
            return false;
        }
        let mut state = self.state.lock().expect("manual timer lock poisoned");
        let before = state.pending.len();
        state.pending.retain(|timer| timer.id != handle.as_raw());
        state.pending.len() < before
    }
}

struct QueuedTask {
    label: String,
    priority: JobPriority,
    task: TaskFuture,
}

/// A [`TaskExecutor`] that queues submissions for the test to drive.
///
/// Unlike production executors, [`run_next`](QueueExecutor::run_next) polls
/// the submission on the calling task; that inversion is exactly what makes
/// race interleavings reproducible.
#[derive(Default)]
pub struct QueueExecutor {
    queue: Mutex<VecDeque<QueuedTask>>,
}

impl QueueExecutor {
    /// Create a queueing executor.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of submissions not yet run.
    pub fn pending_count(&self) -> usize {
        self.queue.lock().expect("queue executor lock poisoned").len()
    }

    /// Labels of the queued submissions, oldest first.
    pub fn labels(&self) -> Vec<String> {
        self.queue
            .lock()
            .expect("queue executor lock poisoned")
            .iter()
            .map(|task| task.label.clone())
            .collect()
    }

    /// Priority of the most recently submitted task.
    pub fn last_priority(&self) -> Option<JobPriority> {
        self.queue
            .lock()
            .expect("queue executor lock poisoned")
            .back()
            .map(|task| task.priority)
    }

    /// Detach the oldest queued submission without running it.
    pub fn take_next(&self) -> Option<TaskFuture> {
        self.queue
            .lock()
            .expect("queue executor lock poisoned")
            .pop_front()
            .map(|task| task.task)
    }

    /// Run the oldest queued submission to completion. Returns `false` if
    /// none is queued.
    pub async fn run_next(&self) -> bool {
        match self.take_next() {
            Some(task) => {
                task.await;
                true
            }
            None => false,
        }
    }

    /// Run queued submissions until none remain. Returns how many ran.
    pub async fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next().await {
            ran += 1;
        }
        ran
    }
}

impl TaskExecutor for QueueExecutor {
    fn submit(&self, label: &str, priority: JobPriority, task: TaskFuture) {
        self.queue
            .lock()
            .expect("queue executor lock poisoned")
            .push_back(QueuedTask {
                label: label.to_string(),
                priority,
                task,
            });
    }
}

/// A [`BackgroundJob`] that records its invocations.
///
/// Every run counts a start on entry and a finish on exit, tracks the start
/// time, and flags overlap if two invocations are ever active at once.
pub struct CountingJob {
    run_duration: Duration,
    gate: Option<Notify>,
    respect_cancel: bool,
    fail_with: Option<String>,
    starts: AtomicUsize,
    finishes: AtomicUsize,
    active: AtomicUsize,
    overlapped: AtomicBool,
    start_times: Mutex<Vec<Instant>>,
}

impl CountingJob {
    fn build(
        run_duration: Duration,
        gate: bool,
        respect_cancel: bool,
        fail_with: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            run_duration,
            gate: gate.then(Notify::new),
            respect_cancel,
            fail_with,
            starts: AtomicUsize::new(0),
            finishes: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
            start_times: Mutex::new(Vec::new()),
        })
    }

    /// A job whose every run sleeps for `run_duration`.
    pub fn new(run_duration: Duration) -> Arc<Self> {
        Self::build(run_duration, false, false, None)
    }

    /// A job whose every run blocks until [`release_one`](Self::release_one),
    /// ignoring the cancellation signal.
    pub fn gated() -> Arc<Self> {
        Self::build(Duration::ZERO, true, false, None)
    }

    /// A job that sleeps for `run_duration` but exits with
    /// [`JobError::Cancelled`] as soon as the cancellation signal arrives.
    pub fn cancel_aware(run_duration: Duration) -> Arc<Self> {
        Self::build(run_duration, false, true, None)
    }

    /// A job that sleeps for `run_duration` and then fails with `message`.
    pub fn failing(run_duration: Duration, message: &str) -> Arc<Self> {
        Self::build(run_duration, false, false, Some(message.to_string()))
    }

    /// Let one gated run proceed. Stores a permit if none is waiting yet.
    pub fn release_one(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Number of runs that started.
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of runs that finished.
    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }

    /// Whether two invocations were ever active at the same time.
    pub fn overlap_detected(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    /// Start times of all runs, in order.
    pub fn start_times(&self) -> Vec<Instant> {
        self.start_times
            .lock()
            .expect("counting job lock poisoned")
            .clone()
    }
}

#[async_trait]
impl BackgroundJob for CountingJob {
    async fn run(&self, cancel: CancellationToken) -> Result<(), JobError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.active.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.start_times
            .lock()
            .expect("counting job lock poisoned")
            .push(Instant::now());

        let mut outcome = Ok(());
        if let Some(gate) = &self.gate {
            if self.respect_cancel {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = cancel.cancelled() => outcome = Err(JobError::Cancelled),
                }
            } else {
                gate.notified().await;
            }
        } else if self.respect_cancel {
            tokio::select! {
                _ = tokio::time::sleep(self.run_duration) => {}
                _ = cancel.cancelled() => outcome = Err(JobError::Cancelled),
            }
        } else if !self.run_duration.is_zero() {
            tokio::time::sleep(self.run_duration).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finishes.fetch_add(1, Ordering::SeqCst);
        if outcome.is_ok() {
            if let Some(message) = &self.fail_with {
                return Err(JobError::failed(message.clone()));
            }
        }
        outcome
    }
}
