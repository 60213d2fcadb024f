//! The background job trait and its error type.
//!
//! A [`BackgroundJob`] is the user-supplied unit of work that a
//! [`DelayedJob`](crate::scheduler::DelayedJob) runs. The scheduler guarantees
//! that at most one invocation is active at any time; the job in turn is
//! responsible for observing the cooperative [`CancellationToken`] it receives
//! and exiting promptly once termination has been requested. No job is ever
//! aborted forcibly.

use async_trait::async_trait;
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::types::JobPriority;

/// Errors a background job can report to its executor.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job ran but could not complete its work.
    #[error("job failed: {0}")]
    Failed(String),

    /// The job observed the cancellation signal and exited early.
    #[error("job cancelled before completion")]
    Cancelled,
}

impl JobError {
    /// Create a [`JobError::Failed`] from any message.
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}

/// A unit of work that can be scheduled for delayed, coalesced execution.
///
/// Implementations must be safe to share between threads; the scheduler holds
/// the job behind an `Arc` and invokes it from executor worker tasks. For long
/// computations, poll `cancel.is_cancelled()` (or select on `cancel.cancelled()`)
/// periodically so that termination stays prompt.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Execute one run of the job.
    ///
    /// `cancel` is cancelled exactly once, when the owning scheduler is
    /// terminated. Returning [`JobError::Cancelled`] after observing it is
    /// the conventional way to report an early exit.
    async fn run(&self, cancel: CancellationToken) -> Result<(), JobError>;

    /// Priority hint for the executor. Defaults to [`JobPriority::Normal`].
    fn priority(&self) -> JobPriority {
        JobPriority::Normal
    }
}

/// Adapter that turns an async closure into a [`BackgroundJob`].
///
/// # Example
///
/// ```
/// use snooze::{CancellationToken, FnJob, JobError};
///
/// let job = FnJob::new(|_cancel: CancellationToken| async move {
///     // do the work
///     Ok::<(), JobError>(())
/// });
/// ```
pub struct FnJob<F> {
    f: F,
    priority: JobPriority,
}

impl<F> FnJob<F> {
    /// Wrap a closure as a normal-priority background job.
    pub fn new(f: F) -> Self {
        Self {
            f,
            priority: JobPriority::Normal,
        }
    }

    /// Set the priority hint exposed to the executor.
    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl<F, Fut> BackgroundJob for FnJob<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send,
{
    async fn run(&self, cancel: CancellationToken) -> Result<(), JobError> {
        (self.f)(cancel).await
    }

    fn priority(&self) -> JobPriority {
        self.priority
    }
}
