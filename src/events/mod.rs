//! Lifecycle events and event handling.
//!
//! This module provides event emission for scheduler lifecycle events,
//! enabling observability into triggers, runs, and termination.
//!
//! Handlers are synchronous because events are emitted from bookkeeping paths
//! (timer callbacks, run-completion guards) that must stay cheap; a handler
//! that needs to do real work should hand the event off to its own channel.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::core::types::RunId;

/// How a run of the background job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The job returned `Ok`.
    Success,
    /// The job returned an error, carried here as its display form.
    Failed(String),
    /// The job observed the cancellation signal and exited early.
    Cancelled,
    /// The job panicked; scheduler bookkeeping still completed.
    Panicked,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::Failed(error) => write!(f, "failed: {}", error),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::Panicked => write!(f, "panicked"),
        }
    }
}

/// Lifecycle events emitted by a scheduler.
#[derive(Debug, Clone)]
pub enum Event {
    /// A trigger was accepted and moved the next execution time earlier.
    /// Coalesced (no-op) triggers emit nothing.
    Triggered {
        job: String,
        delay: Duration,
        timestamp: Instant,
    },

    /// A run of the background job has started.
    RunStarted {
        job: String,
        run_id: RunId,
        timestamp: Instant,
    },

    /// A run of the background job has finished.
    RunCompleted {
        job: String,
        run_id: RunId,
        outcome: RunOutcome,
        duration: Duration,
        timestamp: Instant,
    },

    /// Termination was requested while a run was in flight; the cancellation
    /// signal has been delivered and the scheduler is waiting for the run.
    Terminating { job: String, timestamp: Instant },

    /// The scheduler reached its terminal state.
    Terminated { job: String, timestamp: Instant },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::Triggered { timestamp, .. } => *timestamp,
            Event::RunStarted { timestamp, .. } => *timestamp,
            Event::RunCompleted { timestamp, .. } => *timestamp,
            Event::Terminating { timestamp, .. } => *timestamp,
            Event::Terminated { timestamp, .. } => *timestamp,
        }
    }

    /// Name of the scheduler that emitted the event.
    pub fn job(&self) -> &str {
        match self {
            Event::Triggered { job, .. } => job,
            Event::RunStarted { job, .. } => job,
            Event::RunCompleted { job, .. } => job,
            Event::Terminating { job, .. } => job,
            Event::Terminated { job, .. } => job,
        }
    }

    /// Create a Triggered event.
    pub fn triggered(job: impl Into<String>, delay: Duration) -> Self {
        Event::Triggered {
            job: job.into(),
            delay,
            timestamp: Instant::now(),
        }
    }

    /// Create a RunStarted event.
    pub fn run_started(job: impl Into<String>, run_id: RunId) -> Self {
        Event::RunStarted {
            job: job.into(),
            run_id,
            timestamp: Instant::now(),
        }
    }

    /// Create a RunCompleted event.
    pub fn run_completed(
        job: impl Into<String>,
        run_id: RunId,
        outcome: RunOutcome,
        duration: Duration,
    ) -> Self {
        Event::RunCompleted {
            job: job.into(),
            run_id,
            outcome,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a Terminating event.
    pub fn terminating(job: impl Into<String>) -> Self {
        Event::Terminating {
            job: job.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a Terminated event.
    pub fn terminated(job: impl Into<String>) -> Self {
        Event::Terminated {
            job: job.into(),
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events. Must be cheap and non-blocking.
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().expect("event bus lock poisoned");
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub fn emit(&self, event: Event) {
        let handlers = self.handlers.read().expect("event bus lock poisoned");
        for handler in handlers.iter() {
            handler.handle(&event);
        }
    }

    /// Get the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().expect("event bus lock poisoned").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
