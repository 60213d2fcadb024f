//! Delayed job engine implementation.
//!
//! The engine is responsible for:
//! - Coalescing closely spaced triggers into the minimum number of runs
//! - Guaranteeing one more run for any trigger after a run has started
//! - Keeping at most one invocation of the job active at any time
//! - Cooperative, never forcible, termination
//!
//! All bookkeeping happens under one mutex held only for short critical
//! sections, never across the execution of the user job. Timer callbacks are
//! cheap: they check a generation token and submit work to the executor.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::job::{BackgroundJob, JobError};
use crate::core::types::RunId;
use crate::events::{Event, EventBus, RunOutcome};
use crate::runtime::executor::TaskExecutor;
use crate::runtime::timer::{TimerHandle, TimerService};

use super::builder::DelayedJobBuilder;
use super::types::JobState;

/// A delayed, trigger-coalescing background job scheduler.
///
/// Many callers may [`trigger`](DelayedJob::trigger) execution of a single
/// long-running [`BackgroundJob`]; repeated requests collapse into the minimum
/// number of actual runs. The first trigger received after the start of the
/// last run leads to exactly one further run, beginning no earlier than both
/// the requested time and the end of the current run.
///
/// All methods are safe to call from any thread, at any time, including
/// concurrently with one another. Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct DelayedJob {
    shared: Arc<Shared>,
}

/// A ticket minted each time the scheduler enters `Waiting` (and on every
/// rearm). The generation is the authority: a fired timer callback whose
/// generation no longer matches has been replaced and must no-op.
struct WaitingTicket {
    generation: u64,
    fired: bool,
    timer: Option<TimerHandle>,
}

/// Mutable scheduler state, guarded by the one bookkeeping mutex.
struct StateCell {
    state: JobState,
    /// Absolute time of the next requested execution; `None` means none
    /// requested. Set while `Waiting`, or while `Running` holding a deferred
    /// request to be honored after completion.
    next_execution: Option<Instant>,
    /// Present iff state is `Waiting`.
    waiting: Option<WaitingTicket>,
    /// Present iff state is `Running` or `Terminating`.
    running: Option<RunId>,
    /// Monotonically increasing mint counter for waiting tickets.
    generation: u64,
}

struct Shared {
    name: String,
    default_delay: Duration,
    job: Arc<dyn BackgroundJob>,
    timer: Arc<dyn TimerService>,
    executor: Arc<dyn TaskExecutor>,
    events: Arc<EventBus>,
    cancel: CancellationToken,
    terminated_tx: watch::Sender<bool>,
    cell: Mutex<StateCell>,
}

impl DelayedJob {
    /// Start building a scheduler.
    pub fn builder() -> DelayedJobBuilder {
        DelayedJobBuilder::new()
    }

    pub(crate) fn new(
        job: Arc<dyn BackgroundJob>,
        name: String,
        default_delay: Duration,
        timer: Arc<dyn TimerService>,
        executor: Arc<dyn TaskExecutor>,
        events: Arc<EventBus>,
    ) -> Self {
        let (terminated_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                name,
                default_delay,
                job,
                timer,
                executor,
                events,
                cancel: CancellationToken::new(),
                terminated_tx,
                cell: Mutex::new(StateCell {
                    state: JobState::Idle,
                    next_execution: None,
                    waiting: None,
                    running: None,
                    generation: 0,
                }),
            }),
        }
    }

    /// Request a run within the configured default delay.
    ///
    /// See [`trigger_after`](DelayedJob::trigger_after).
    pub fn trigger(&self) {
        self.shared.try_enqueue(self.shared.default_delay);
    }

    /// Request a run within `delay`.
    ///
    /// If no run is scheduled, one is scheduled for `delay` from now (a zero
    /// delay submits it right away). If a run is already scheduled later than
    /// the requested time, it is rescheduled earlier; otherwise the request
    /// coalesces into the pending one. A request received while the job is
    /// running is honored with exactly one further run after it finishes.
    /// Ignored once termination has been requested.
    pub fn trigger_after(&self, delay: Duration) {
        self.shared.try_enqueue(delay);
    }

    /// Request shutdown. Idempotent, never blocks.
    ///
    /// With no run in flight the scheduler terminates immediately, cancelling
    /// any pending timer. With a run in flight it delivers the cooperative
    /// cancellation signal and terminates once the run exits; the job is never
    /// aborted forcibly.
    pub fn terminate(&self) {
        self.shared.terminate();
    }

    /// Whether the scheduler has reached its terminal state.
    pub fn is_terminated(&self) -> bool {
        self.shared.lock().state == JobState::Terminated
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.shared.lock().state
    }

    /// Human-readable name of this scheduler.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The delay used by [`trigger`](DelayedJob::trigger).
    pub fn default_delay(&self) -> Duration {
        self.shared.default_delay
    }

    /// Wait until the scheduler is terminated or `timeout` elapses.
    ///
    /// Returns `true` iff the scheduler is terminated; an elapsed timeout is
    /// a normal `false` return, never an error. A zero timeout never waits.
    /// Cancelling this future cannot corrupt scheduler state.
    pub async fn wait_for_termination(&self, timeout: Duration) -> bool {
        if self.is_terminated() {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }
        let mut rx = self.shared.terminated_tx.subscribe();
        let result = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|terminated| *terminated)).await,
            Ok(Ok(_))
        );
        result
    }

    /// Wait until the scheduler is terminated, without a timeout.
    pub async fn terminated(&self) {
        let mut rx = self.shared.terminated_tx.subscribe();
        let _ = rx.wait_for(|terminated| *terminated).await;
    }
}

impl fmt::Debug for DelayedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedJob")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StateCell> {
        self.cell.lock().expect("scheduler state lock poisoned")
    }

    /// Implementation of the trigger operations.
    fn try_enqueue(self: &Arc<Self>, delay: Duration) {
        let mut cell = self.lock();
        if matches!(cell.state, JobState::Terminating | JobState::Terminated) {
            tracing::trace!(job = %self.name, "trigger ignored after termination request");
            return;
        }
        // A delay large enough to overflow can never become the earliest request.
        let Some(target) = Instant::now().checked_add(delay) else {
            return;
        };
        let earlier = cell.next_execution.map_or(true, |next| target < next);
        if !earlier {
            // Coalesced into the already pending (or deferred) request.
            tracing::trace!(job = %self.name, "trigger coalesced");
            return;
        }
        cell.next_execution = Some(target);
        if cell.state == JobState::Running {
            // The finish path schedules this request once the run completes.
            tracing::debug!(
                job = %self.name,
                delay_ms = delay.as_millis() as u64,
                "trigger deferred until running job finishes"
            );
        } else {
            self.enqueue_waiting(&mut cell, delay);
        }
        drop(cell);
        self.events.emit(Event::triggered(&self.name, delay));
    }

    /// Arm (or rearm) the waiting ticket for `delay` from now. A zero delay
    /// skips the timer and submits right away. Caller holds the lock and
    /// guarantees state is `Idle` or `Waiting`.
    fn enqueue_waiting(self: &Arc<Self>, cell: &mut StateCell, delay: Duration) {
        debug_assert!(matches!(cell.state, JobState::Idle | JobState::Waiting));
        if let Some(stale) = cell.waiting.take() {
            // Best-effort removal; if the timer already fired, its callback
            // is disarmed by the generation check instead.
            if let Some(handle) = stale.timer {
                let _ = self.timer.cancel(&handle);
            }
        }
        cell.generation += 1;
        let generation = cell.generation;
        cell.state = JobState::Waiting;
        tracing::debug!(
            job = %self.name,
            generation,
            delay_ms = delay.as_millis() as u64,
            "scheduled"
        );

        if delay.is_zero() {
            cell.waiting = Some(WaitingTicket {
                generation,
                fired: true,
                timer: None,
            });
            self.submit_run(generation);
        } else {
            let shared = Arc::clone(self);
            let label = format!("{} (waiting)", self.name);
            let handle = self.timer.schedule(
                &label,
                delay,
                Box::new(move || shared.on_timer_fired(generation)),
            );
            cell.waiting = Some(WaitingTicket {
                generation,
                fired: false,
                timer: Some(handle),
            });
        }
    }

    /// Timer callback: submit the run if this timer is still the authority.
    fn on_timer_fired(self: &Arc<Self>, generation: u64) {
        let mut cell = self.lock();
        match cell.waiting.as_mut() {
            Some(ticket) if ticket.generation == generation && !ticket.fired => {
                ticket.fired = true;
            }
            _ => {
                tracing::trace!(job = %self.name, generation, "stale timer fired, ignoring");
                return;
            }
        }
        debug_assert_eq!(cell.state, JobState::Waiting);
        self.submit_run(generation);
    }

    /// Hand the run wrapper to the executor. Cheap and non-blocking; the
    /// `Waiting -> Running` transition happens on the worker.
    fn submit_run(self: &Arc<Self>, generation: u64) {
        let shared = Arc::clone(self);
        let label = format!("{} (running)", self.name);
        self.executor.submit(
            &label,
            self.job.priority(),
            Box::pin(async move { shared.run_wrapper(generation).await }),
        );
    }

    /// The wrapper executed on the worker around every invocation attempt.
    async fn run_wrapper(self: Arc<Self>, generation: u64) {
        let Some(run_id) = self.on_run_started(generation) else {
            // Overtaken between submission and start; the job must not run.
            return;
        };
        self.events.emit(Event::run_started(&self.name, run_id.clone()));

        // The guard makes the finish transition unconditional: it runs on
        // normal completion, on job error, and during unwinding on panic.
        let mut guard = FinishGuard {
            shared: Arc::clone(&self),
            run_id: run_id.clone(),
            started_at: Instant::now(),
            outcome: None,
        };
        let outcome = match self.job.run(self.cancel.clone()).await {
            Ok(()) => RunOutcome::Success,
            Err(JobError::Cancelled) => {
                tracing::debug!(job = %self.name, run = %run_id, "job exited on cancellation signal");
                RunOutcome::Cancelled
            }
            Err(error) => {
                tracing::warn!(job = %self.name, run = %run_id, %error, "background job failed");
                RunOutcome::Failed(error.to_string())
            }
        };
        guard.outcome = Some(outcome);
    }

    /// Attempted `Waiting -> Running` transition. Refuses (and the job must
    /// not run) if the scheduler terminated, or the ticket was superseded,
    /// between submission and start.
    fn on_run_started(&self, generation: u64) -> Option<RunId> {
        let mut cell = self.lock();
        if cell.state != JobState::Waiting {
            return None;
        }
        match &cell.waiting {
            Some(ticket) if ticket.generation == generation => {}
            _ => return None,
        }
        cell.waiting = None;
        cell.next_execution = None;
        cell.state = JobState::Running;
        let run_id = RunId::new();
        cell.running = Some(run_id.clone());
        tracing::debug!(job = %self.name, run = %run_id, "run started");
        Some(run_id)
    }

    /// Runs exactly once after every started run: honor a termination request,
    /// rearm for a deferred trigger, or fall back to idle.
    fn on_run_finished(self: &Arc<Self>, run_id: RunId, duration: Duration, outcome: RunOutcome) {
        let mut cell = self.lock();
        let reached_terminated = match cell.state {
            JobState::Terminating => {
                cell.running = None;
                cell.state = JobState::Terminated;
                true
            }
            JobState::Running => {
                cell.running = None;
                cell.state = JobState::Idle;
                if let Some(target) = cell.next_execution {
                    let remaining = target.saturating_duration_since(Instant::now());
                    tracing::debug!(
                        job = %self.name,
                        remaining_ms = remaining.as_millis() as u64,
                        "re-arming for trigger received during run"
                    );
                    self.enqueue_waiting(&mut cell, remaining);
                }
                false
            }
            state => {
                // The only paths out of Running/Terminating go through here.
                debug_assert!(false, "run finished in state {:?}", state);
                false
            }
        };
        drop(cell);

        tracing::debug!(
            job = %self.name,
            run = %run_id,
            %outcome,
            duration_ms = duration.as_millis() as u64,
            "run finished"
        );
        self.events
            .emit(Event::run_completed(&self.name, run_id, outcome, duration));
        if reached_terminated {
            self.notify_terminated();
        }
    }

    fn terminate(self: &Arc<Self>) {
        let mut cell = self.lock();
        match cell.state {
            JobState::Terminating | JobState::Terminated => return,
            JobState::Idle => {
                cell.state = JobState::Terminated;
            }
            JobState::Waiting => {
                if let Some(ticket) = cell.waiting.take() {
                    if let Some(handle) = ticket.timer {
                        let _ = self.timer.cancel(&handle);
                    }
                }
                cell.next_execution = None;
                cell.state = JobState::Terminated;
            }
            JobState::Running => {
                // Termination wins over any deferred trigger.
                cell.next_execution = None;
                cell.state = JobState::Terminating;
                drop(cell);
                tracing::debug!(job = %self.name, "terminating, cancellation signal delivered");
                self.cancel.cancel();
                self.events.emit(Event::terminating(&self.name));
                return;
            }
        }
        drop(cell);
        self.notify_terminated();
    }

    /// Wake every waiter; called exactly once, on the transition into
    /// `Terminated`.
    fn notify_terminated(&self) {
        tracing::info!(job = %self.name, "terminated");
        self.terminated_tx.send_replace(true);
        self.events.emit(Event::terminated(&self.name));
    }
}

/// Guarantees the finish transition for a started run, even when the job
/// panics and the wrapper unwinds.
struct FinishGuard {
    shared: Arc<Shared>,
    run_id: RunId,
    started_at: Instant,
    outcome: Option<RunOutcome>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or(RunOutcome::Panicked);
        let duration = self.started_at.elapsed();
        self.shared
            .on_run_finished(self.run_id.clone(), duration, outcome);
    }
}
