//! Termination semantics: idempotence, bounded waits, graceful shutdown.

use std::time::Duration;

use snooze::testing::CountingJob;
use snooze::{JobGroup, JobState};
use tokio::time::Instant;

use crate::common::{scheduler, wait_until};

#[tokio::test]
async fn terminate_when_idle_is_immediate_and_idempotent() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("idle-term", Duration::from_millis(50), &job);

    sched.terminate();
    assert!(sched.is_terminated());
    assert!(sched.wait_for_termination(Duration::ZERO).await);

    sched.terminate();
    assert!(sched.is_terminated());
    assert_eq!(job.starts(), 0);
}

#[tokio::test]
async fn terminate_discards_a_pending_trigger() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("discard", Duration::from_secs(60), &job);

    sched.trigger();
    assert_eq!(sched.state(), JobState::Waiting);

    sched.terminate();
    assert!(sched.is_terminated());
    assert_eq!(job.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn wait_for_termination_times_out_after_exactly_the_timeout() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("bounded", Duration::from_millis(50), &job);

    let before = Instant::now();
    assert!(!sched.wait_for_termination(Duration::from_millis(100)).await);
    assert_eq!(before.elapsed(), Duration::from_millis(100));
}

#[tokio::test]
async fn terminate_waits_for_the_running_job() {
    let job = CountingJob::gated();
    let sched = scheduler("graceful", Duration::ZERO, &job);

    sched.trigger();
    wait_until(|| job.starts() == 1).await;

    sched.terminate();
    assert_eq!(sched.state(), JobState::Terminating);
    assert!(!sched.wait_for_termination(Duration::ZERO).await);
    assert_eq!(job.finishes(), 0);

    job.release_one();
    assert!(sched.wait_for_termination(Duration::from_secs(5)).await);
    assert_eq!(job.finishes(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_signal_makes_shutdown_prompt() {
    // The job would run for an hour, but it watches the cancellation signal.
    let job = CountingJob::cancel_aware(Duration::from_secs(3600));
    let sched = scheduler("prompt", Duration::ZERO, &job);

    sched.trigger();
    wait_until(|| job.starts() == 1).await;

    let before = Instant::now();
    sched.terminate();
    assert!(sched.wait_for_termination(Duration::from_secs(1)).await);
    assert!(before.elapsed() < Duration::from_secs(1));
    assert_eq!(job.finishes(), 1);
}

#[tokio::test]
async fn triggers_after_termination_never_run_anything() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("dead", Duration::ZERO, &job);

    sched.terminate();
    sched.trigger();
    sched.trigger_after(Duration::ZERO);
    tokio::task::yield_now().await;

    assert_eq!(job.starts(), 0);
    assert!(sched.is_terminated());
}

#[tokio::test]
async fn group_terminates_all_members_within_one_deadline() {
    let group = JobGroup::new();
    let mut jobs = Vec::new();
    for name in ["sweep-a", "sweep-b", "sweep-c"] {
        let job = CountingJob::new(Duration::ZERO);
        let sched = scheduler(name, Duration::from_secs(60), &job);
        sched.trigger();
        group.register(sched);
        jobs.push(job);
    }
    assert!(!group.all_terminated());

    group.terminate_all();
    assert!(group.wait_for_termination_all(Duration::from_secs(1)).await);
    assert!(group.all_terminated());
    assert!(jobs.iter().all(|job| job.starts() == 0));
}
