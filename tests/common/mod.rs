//! Shared helpers for integration tests.

use std::time::Duration;

use std::sync::{Arc, Once};

use snooze::testing::CountingJob;
use snooze::DelayedJob;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Poll `condition` until it holds, yielding between polls so spawned tasks
/// make progress. Panics if it never holds; with a paused clock that means a
/// task that should be ready is not.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not met after 10000 polls");
}

/// Build a scheduler over `job` with tokio-backed collaborators.
pub fn scheduler(name: &str, default_delay: Duration, job: &Arc<CountingJob>) -> DelayedJob {
    init_tracing();
    DelayedJob::builder()
        .name(name)
        .default_delay(default_delay)
        .job_arc(Arc::clone(job) as Arc<dyn snooze::BackgroundJob>)
        .build()
        .expect("scheduler construction failed")
}
