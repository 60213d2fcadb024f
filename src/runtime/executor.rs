//! Executor collaborator: asynchronous execution of submitted work.
//!
//! The scheduler hands each accepted run to a [`TaskExecutor`] as a boxed
//! future. Executors run submissions on worker tasks, never inline in the
//! submitting call, so timer callbacks that submit work stay non-blocking.

use std::future::Future;
use std::pin::Pin;

use tokio::runtime::Handle;

use crate::core::types::JobPriority;

/// A boxed unit of work accepted by a [`TaskExecutor`].
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A worker facility that runs submitted work asynchronously.
///
/// `submit` must not block and must not poll the future inline; the work runs
/// on a separate worker task. The priority hint may be ignored.
pub trait TaskExecutor: Send + Sync {
    /// Submit a unit of work for asynchronous execution.
    fn submit(&self, label: &str, priority: JobPriority, task: TaskFuture);
}

/// Production [`TaskExecutor`] that spawns submissions onto a tokio runtime.
///
/// Tokio has no task priorities, so the hint is only recorded in the
/// submission trace.
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Create an executor bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime; use [`TokioExecutor::with_handle`] there.
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create an executor bound to an explicit runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Default for TokioExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutor for TokioExecutor {
    fn submit(&self, label: &str, priority: JobPriority, task: TaskFuture) {
        tracing::trace!(task = %label, %priority, "submitting background work");
        self.handle.spawn(task);
    }
}
