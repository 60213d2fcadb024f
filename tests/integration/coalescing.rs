//! Trigger coalescing under a paused clock.

use std::time::Duration;

use snooze::testing::CountingJob;
use tokio::time::{advance, Instant};

use crate::common::{scheduler, wait_until};

#[tokio::test(start_paused = true)]
async fn burst_of_triggers_runs_once_at_the_first_deadline() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("coalesce", Duration::from_millis(50), &job);
    let t0 = Instant::now();

    sched.trigger();
    advance(Duration::from_millis(10)).await;
    sched.trigger();
    advance(Duration::from_millis(10)).await;
    sched.trigger();

    // The first trigger's deadline governs; the later ones coalesce into it.
    advance(Duration::from_millis(30)).await;
    wait_until(|| job.finishes() == 1).await;
    assert_eq!(job.start_times(), vec![t0 + Duration::from_millis(50)]);

    // Nothing further was scheduled.
    advance(Duration::from_millis(500)).await;
    tokio::task::yield_now().await;
    assert_eq!(job.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn shorter_delay_pulls_the_run_earlier() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("pull-earlier", Duration::from_millis(100), &job);
    let t0 = Instant::now();

    sched.trigger();
    advance(Duration::from_millis(30)).await;
    sched.trigger_after(Duration::from_millis(10));

    advance(Duration::from_millis(10)).await;
    wait_until(|| job.finishes() == 1).await;
    assert_eq!(job.start_times(), vec![t0 + Duration::from_millis(40)]);
}

#[tokio::test(start_paused = true)]
async fn longer_delay_does_not_push_the_run_later() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("no-push", Duration::from_millis(50), &job);
    let t0 = Instant::now();

    sched.trigger();
    sched.trigger_after(Duration::from_millis(400));

    advance(Duration::from_millis(50)).await;
    wait_until(|| job.finishes() == 1).await;
    assert_eq!(job.start_times(), vec![t0 + Duration::from_millis(50)]);

    advance(Duration::from_millis(400)).await;
    tokio::task::yield_now().await;
    assert_eq!(job.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn many_simultaneous_triggers_run_once() {
    let job = CountingJob::new(Duration::ZERO);
    let sched = scheduler("storm", Duration::from_millis(20), &job);

    for _ in 0..100 {
        sched.trigger();
    }

    advance(Duration::from_millis(20)).await;
    wait_until(|| job.finishes() == 1).await;
    assert_eq!(job.starts(), 1);
}
