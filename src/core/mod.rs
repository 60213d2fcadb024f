//! Core domain types: the background job trait, run identifiers, priorities.

pub mod job;
pub mod types;

pub use job::{BackgroundJob, FnJob, JobError};
pub use types::{JobPriority, RunId};
