//! External collaborators consumed by the scheduler: timers and executors.

pub mod executor;
pub mod timer;

pub use executor::{TaskExecutor, TaskFuture, TokioExecutor};
pub use timer::{TimerCallback, TimerHandle, TimerService, TokioTimer};
