//! Collective termination of many schedulers.
//!
//! A [`JobGroup`] tracks schedulers so a subsystem can shut them all down and
//! await their termination under a single deadline, the way an application
//! shutdown sweep wants to.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use super::engine::DelayedJob;

/// A registry of [`DelayedJob`] schedulers with group-wide shutdown.
#[derive(Default)]
pub struct JobGroup {
    jobs: Mutex<Vec<DelayedJob>>,
}

impl JobGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scheduler to the group.
    pub fn register(&self, job: DelayedJob) {
        self.jobs.lock().expect("job group lock poisoned").push(job);
    }

    /// Number of registered schedulers.
    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job group lock poisoned").len()
    }

    /// Whether the group is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request termination of every registered scheduler. Idempotent.
    pub fn terminate_all(&self) {
        let jobs = self.jobs.lock().expect("job group lock poisoned");
        for job in jobs.iter() {
            job.terminate();
        }
    }

    /// Whether every registered scheduler has terminated.
    pub fn all_terminated(&self) -> bool {
        let jobs = self.jobs.lock().expect("job group lock poisoned");
        jobs.iter().all(|job| job.is_terminated())
    }

    /// Wait until every registered scheduler has terminated or `timeout`
    /// elapses. The deadline is shared across members; returns `true` iff
    /// all terminated in time.
    pub async fn wait_for_termination_all(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let jobs: Vec<DelayedJob> = self
            .jobs
            .lock()
            .expect("job group lock poisoned")
            .clone();
        for job in jobs {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !job.wait_for_termination(remaining).await {
                return false;
            }
        }
        true
    }
}
