//! snooze: delayed, trigger-coalescing background job scheduling.
//!
//! A [`DelayedJob`] wraps a [`BackgroundJob`] and runs it soon after it is
//! triggered, coalescing bursts of triggers into single runs. Triggers that
//! arrive while the job is running are remembered and honored by a rerun, so
//! the job always observes the state that existed after its last trigger.
//! Termination is cooperative and idempotent, and can be awaited with a
//! bounded timeout.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use snooze::{CancellationToken, DelayedJob, FnJob, JobError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let sched = DelayedJob::builder()
//!     .name("index-refresh")
//!     .default_delay(Duration::from_millis(50))
//!     .job(FnJob::new(|_cancel: CancellationToken| async {
//!         // Recompute the index here.
//!         Ok::<(), JobError>(())
//!     }))
//!     .build()
//!     .unwrap();
//!
//! // Any burst of triggers within the delay window collapses into one run.
//! sched.trigger();
//! sched.trigger();
//!
//! sched.terminate();
//! assert!(sched.wait_for_termination(Duration::from_secs(1)).await);
//! # }
//! ```

pub mod core;
pub mod events;
pub mod runtime;
pub mod scheduler;
pub mod testing;

pub use crate::core::job::{BackgroundJob, FnJob, JobError};
pub use crate::core::types::{JobPriority, RunId};
pub use crate::events::{Event, EventBus, EventHandler, RunOutcome};
pub use crate::runtime::executor::{TaskExecutor, TaskFuture, TokioExecutor};
pub use crate::runtime::timer::{TimerCallback, TimerHandle, TimerService, TokioTimer};
pub use crate::scheduler::{BuildError, DelayedJob, DelayedJobBuilder, JobGroup, JobState};

pub use tokio_util::sync::CancellationToken;
