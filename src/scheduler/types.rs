//! Scheduler type definitions.
//!
//! This module contains the lifecycle state enum and the construction error
//! type for the delayed job scheduler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a [`DelayedJob`](super::DelayedJob).
///
/// The scheduler is a five-state machine. Once `Terminated` is reached it is
/// permanently inert; every further call is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for a trigger; no pending timer, no running job.
    Idle,
    /// A trigger was accepted; a timer is pending, no running job.
    Waiting,
    /// The job is executing on a worker.
    Running,
    /// Termination was requested mid-run; waiting for the job to exit.
    Terminating,
    /// Terminal state; no pending timer, no running job.
    Terminated,
}

impl JobState {
    /// Whether this is the terminal state.
    pub fn is_terminated(&self) -> bool {
        matches!(self, JobState::Terminated)
    }
}

/// Errors that can occur when building a [`DelayedJob`](super::DelayedJob).
///
/// Construction fails fast: a scheduler is never partially built.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No background job was provided.
    #[error("no background job provided")]
    MissingJob,

    /// No job name was provided.
    #[error("no job name provided")]
    MissingName,

    /// The job name was empty.
    #[error("job name must not be empty")]
    EmptyName,

    /// A defaulted collaborator needs a tokio runtime, and none is current.
    #[error("no tokio runtime available to build default {0}")]
    NoRuntime(&'static str),
}
