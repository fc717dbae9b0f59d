//! Behaviour-driven tests for the execution monitor.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use magics_core::CorrelationId;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::{MockQueueService, RecordingReporter, executing, idle, paused};
use crate::api::{HistoryItem, RunResult};
use crate::error::{AbortError, SessionError};
use crate::monitor::{
    AbortPolicy, ActiveJob, CancelToken, JobState, JobTicket, Observation, PollingFeed,
    StatusReporter, abort_job, watch,
};

const ITEM_UID: &str = "item-abc123";

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TestWorld {
    service: MockQueueService,
    reporter: Arc<RecordingReporter>,
    job: Option<ActiveJob>,
    abort: Option<Result<(), AbortError>>,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

fn job(world: &TestWorld) -> &ActiveJob {
    world.job.as_ref().expect("a job was acknowledged")
}

fn service(world: &mut TestWorld) -> Arc<MockQueueService> {
    Arc::new(std::mem::take(&mut world.service))
}

fn parse_state(label: &str) -> JobState {
    match label {
        "queued" => JobState::Queued,
        "running" => JobState::Running,
        "succeeded" => JobState::Succeeded,
        "failed" => JobState::Failed,
        "aborted" => JobState::Aborted,
        other => panic!("unsupported job state '{other}'"),
    }
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("the server acknowledged job \"{correlation}\"")]
fn given_acknowledged(world: &mut TestWorld, correlation: String) {
    let ticket = JobTicket::new(CorrelationId::from(correlation.as_str()), ITEM_UID, "count");
    let reporter: Arc<dyn StatusReporter> = Arc::clone(&world.reporter) as Arc<dyn StatusReporter>;
    world.job = Some(ActiveJob::new(ticket, reporter));
}

#[given("the next poll reports \"{exit_status}\" with \"{message}\"")]
fn given_next_poll(world: &mut TestWorld, exit_status: String, message: String) {
    world.service.expect_status().returning(|| Ok(idle(1)));
    world.service.expect_history().returning(move || {
        Ok(vec![HistoryItem {
            name: String::from("count"),
            item_uid: String::from(ITEM_UID),
            result: Some(RunResult {
                exit_status: exit_status.clone(),
                msg: message.clone(),
                ..RunResult::default()
            }),
            ..HistoryItem::default()
        }])
    });
}

#[given("the job is running")]
fn given_running(world: &mut TestWorld) {
    job(world).observe(Observation::Running);
}

fn expect_pause_handshake(service: &mut MockQueueService) {
    let polls = AtomicUsize::new(0);
    service.expect_status().returning(move || {
        Ok(if polls.fetch_add(1, Ordering::SeqCst) == 0 {
            executing(ITEM_UID, 0)
        } else {
            paused(ITEM_UID)
        })
    });
    service.expect_pause().times(1).returning(|_| Ok(()));
}

#[given("the server refuses to abort")]
fn given_abort_refused(world: &mut TestWorld) {
    expect_pause_handshake(&mut world.service);
    world.service.expect_abort().times(1).returning(|| {
        Err(SessionError::RemoteRejection {
            message: String::from("Failed to abort the plan"),
        })
    });
}

#[given("the server accepts the abort")]
fn given_abort_accepted(world: &mut TestWorld) {
    expect_pause_handshake(&mut world.service);
    world.service.expect_abort().times(1).returning(|| Ok(()));
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the job is monitored")]
fn when_monitored(world: &mut TestWorld) {
    let mut feed = PollingFeed::new(service(world), Duration::ZERO);
    let _ = watch(job(world), &mut feed, &CancelToken::new());
}

#[when("the operator aborts the job")]
fn when_aborted(world: &mut TestWorld) {
    let shared = service(world);
    let policy = AbortPolicy::new(Duration::ZERO, 3);
    let outcome = abort_job(shared.as_ref(), job(world), &policy).map(|_| ());
    world.abort = Some(outcome);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the job ends as \"{state}\"")]
fn then_job_ends(world: &mut TestWorld, state: String) {
    assert_eq!(job(world).status().state(), parse_state(&state));
}

#[then("the reported error reads \"{message}\"")]
fn then_error_reads(world: &mut TestWorld, message: String) {
    assert_eq!(job(world).status().error(), Some(message.as_str()));
}

#[then("the terminal state was reported exactly once")]
fn then_reported_once(world: &mut TestWorld) {
    assert_eq!(world.reporter.terminal_count(), 1);
}

#[then("the abort fails")]
fn then_abort_fails(world: &mut TestWorld) {
    assert!(matches!(world.abort, Some(Err(AbortError::Session(_)))));
}

#[then("the job is still \"{state}\"")]
fn then_job_still(world: &mut TestWorld, state: String) {
    assert_eq!(job(world).status().state(), parse_state(&state));
    assert_eq!(world.reporter.terminal_count(), 0);
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/execution_monitor.feature",
    name = "Remote failures are reported verbatim"
)]
fn remote_failures_verbatim(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/execution_monitor.feature",
    name = "A refused abort leaves the job running"
)]
fn refused_abort(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/execution_monitor.feature",
    name = "An acknowledged abort ends the job"
)]
fn acknowledged_abort(world: TestWorld) {
    let _ = world;
}
