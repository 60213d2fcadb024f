//! Fail-fast construction of [`DelayedJob`] schedulers.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::core::job::BackgroundJob;
use crate::events::EventBus;
use crate::runtime::executor::{TaskExecutor, TokioExecutor};
use crate::runtime::timer::{TimerService, TokioTimer};

use super::engine::DelayedJob;
use super::types::BuildError;

/// Builder for [`DelayedJob`].
///
/// A job and a non-empty name are required. The timer and executor default to
/// tokio-backed implementations bound to the current runtime; building outside
/// a runtime without supplying them explicitly fails with
/// [`BuildError::NoRuntime`]. Construction never partially builds a scheduler.
///
/// The default delay defaults to zero, which makes [`DelayedJob::trigger`]
/// submit immediately; set it to the aggregation window you want.
pub struct DelayedJobBuilder {
    job: Option<Arc<dyn BackgroundJob>>,
    name: Option<String>,
    default_delay: Duration,
    timer: Option<Arc<dyn TimerService>>,
    executor: Option<Arc<dyn TaskExecutor>>,
    events: Option<Arc<EventBus>>,
}

impl DelayedJobBuilder {
    /// Create a builder with no job, no name, and a zero default delay.
    pub fn new() -> Self {
        Self {
            job: None,
            name: None,
            default_delay: Duration::ZERO,
            timer: None,
            executor: None,
            events: None,
        }
    }

    /// Set the background job to run.
    pub fn job(mut self, job: impl BackgroundJob + 'static) -> Self {
        self.job = Some(Arc::new(job));
        self
    }

    /// Set the background job from an existing `Arc`.
    pub fn job_arc(mut self, job: Arc<dyn BackgroundJob>) -> Self {
        self.job = Some(job);
        self
    }

    /// Set the human-readable name, used in logs, timer labels, and events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the aggregation delay used by [`DelayedJob::trigger`].
    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Set the timer service.
    pub fn timer(mut self, timer: Arc<dyn TimerService>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Set the task executor.
    pub fn executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the event bus lifecycle events are emitted to.
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the scheduler, validating every required argument.
    pub fn build(self) -> Result<DelayedJob, BuildError> {
        let job = self.job.ok_or(BuildError::MissingJob)?;
        let name = self.name.ok_or(BuildError::MissingName)?;
        if name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        let timer = match self.timer {
            Some(timer) => timer,
            None => {
                let handle = Handle::try_current().map_err(|_| BuildError::NoRuntime("timer"))?;
                Arc::new(TokioTimer::with_handle(handle))
            }
        };
        let executor = match self.executor {
            Some(executor) => executor,
            None => {
                let handle =
                    Handle::try_current().map_err(|_| BuildError::NoRuntime("executor"))?;
                Arc::new(TokioExecutor::with_handle(handle))
            }
        };
        let events = self.events.unwrap_or_default();
        Ok(DelayedJob::new(
            job,
            name,
            self.default_delay,
            timer,
            executor,
            events,
        ))
    }
}

impl Default for DelayedJobBuilder {
    fn default() -> Self {
        Self::new()
    }
}
