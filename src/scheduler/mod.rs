//! Delayed, trigger-coalescing job scheduling.
//!
//! The scheduler accepts any number of triggers and coalesces them into the
//! minimum number of job runs that still honors every requested deadline. See
//! [`DelayedJob`] for the full lifecycle contract.

mod builder;
mod engine;
mod group;
mod types;

pub use builder::DelayedJobBuilder;
pub use engine::DelayedJob;
pub use group::JobGroup;
pub use types::{BuildError, JobState};
