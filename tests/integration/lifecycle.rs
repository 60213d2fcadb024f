//! Lifecycle event ordering observed through the event bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use snooze::testing::CountingJob;
use snooze::{
    BackgroundJob, DelayedJob, Event, EventBus, EventHandler, JobState, RunOutcome,
};

use crate::common::wait_until;

struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                Event::Triggered { .. } => "triggered",
                Event::RunStarted { .. } => "run_started",
                Event::RunCompleted { .. } => "run_completed",
                Event::Terminating { .. } => "terminating",
                Event::Terminated { .. } => "terminated",
            })
            .collect()
    }

    fn outcomes(&self) -> Vec<RunOutcome> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::RunCompleted { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventHandler for EventLog {
    fn handle(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn observed_scheduler(job: Arc<CountingJob>, log: &Arc<EventLog>) -> DelayedJob {
    let bus = Arc::new(EventBus::new());
    bus.register(Arc::clone(log) as Arc<dyn EventHandler>);
    DelayedJob::builder()
        .name("observed")
        .job_arc(job as Arc<dyn BackgroundJob>)
        .event_bus(bus)
        .build()
        .unwrap()
}

#[tokio::test]
async fn successful_run_emits_events_in_order() {
    let log = EventLog::new();
    let job = CountingJob::new(Duration::ZERO);
    let sched = observed_scheduler(Arc::clone(&job), &log);

    sched.trigger_after(Duration::ZERO);
    wait_until(|| job.finishes() == 1).await;
    wait_until(|| log.kinds().len() == 3).await;

    sched.terminate();
    assert_eq!(
        log.kinds(),
        vec!["triggered", "run_started", "run_completed", "terminated"]
    );
    assert_eq!(log.outcomes(), vec![RunOutcome::Success]);
}

#[tokio::test]
async fn failing_run_reports_the_error_in_its_outcome() {
    let log = EventLog::new();
    let job = CountingJob::failing(Duration::ZERO, "disk full");
    let sched = observed_scheduler(Arc::clone(&job), &log);

    sched.trigger_after(Duration::ZERO);
    wait_until(|| job.finishes() == 1).await;
    wait_until(|| !log.outcomes().is_empty()).await;

    assert_eq!(
        log.outcomes(),
        vec![RunOutcome::Failed("job failed: disk full".to_string())]
    );
    assert_eq!(sched.state(), JobState::Idle);
}

#[tokio::test]
async fn termination_mid_run_emits_terminating_then_terminated() {
    let log = EventLog::new();
    let job = CountingJob::gated();
    let sched = observed_scheduler(Arc::clone(&job), &log);

    sched.trigger_after(Duration::ZERO);
    wait_until(|| job.starts() == 1).await;

    sched.terminate();
    job.release_one();
    assert!(sched.wait_for_termination(Duration::from_secs(5)).await);
    wait_until(|| log.kinds().contains(&"terminated")).await;

    assert_eq!(
        log.kinds(),
        vec![
            "triggered",
            "run_started",
            "terminating",
            "run_completed",
            "terminated"
        ]
    );
}

#[tokio::test]
async fn coalesced_triggers_emit_no_event() {
    let log = EventLog::new();
    let job = CountingJob::gated();
    let sched = observed_scheduler(Arc::clone(&job), &log);

    sched.trigger_after(Duration::from_secs(60));
    sched.trigger_after(Duration::from_secs(120));
    sched.trigger_after(Duration::from_secs(90));

    assert_eq!(log.kinds(), vec!["triggered"]);
    sched.terminate();
}
