//! BDD step definitions for console behavioural tests.
//!
//! These steps map the scenarios in `tests/features/console.feature` to
//! console runs against in-process backends or a fake queue server.

use magics_config::OperationMode;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{FakeQueueServer, TestWorld};

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("the console runs in \"{mode}\" mode")]
fn given_mode(world: &mut TestWorld, mode: String) {
    world.config.mode = mode
        .parse::<OperationMode>()
        .expect("mode names an operation mode");
}

#[given("a queue server that completes every plan")]
fn given_completing_server(world: &mut TestWorld) {
    world.use_server(FakeQueueServer::start().finishing_with("completed", ""));
}

#[given("a queue server where every plan fails with \"{message}\"")]
fn given_failing_server(world: &mut TestWorld, message: String) {
    world.use_server(FakeQueueServer::start().finishing_with("failed", &message));
}

#[given("a queue server that refuses submissions with \"{message}\"")]
fn given_refusing_server(world: &mut TestWorld, message: String) {
    world.use_server(FakeQueueServer::start().refusing(&message));
}

#[given("the operator will type \"{line}\"")]
fn given_typed_line(world: &mut TestWorld, line: String) {
    world.type_line(&line);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the operator runs \"{command}\"")]
fn when_operator_runs(world: &mut TestWorld, command: String) {
    world.run(&command).expect("console runs");
}

#[when("the operator opens the console")]
fn when_operator_opens(world: &mut TestWorld) {
    world.run("").expect("console runs");
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the console exits with code {status}")]
fn then_exit_code(world: &mut TestWorld, status: u8) {
    world
        .assert_exit_code(status)
        .expect("exit code assertion failed");
}

#[then("stdout contains \"{snippet}\"")]
fn then_stdout_contains(world: &mut TestWorld, snippet: String) {
    let stdout = world.stdout.contents();
    assert!(
        stdout.contains(&snippet),
        "stdout {stdout:?} did not contain {snippet:?}"
    );
}

#[then("stderr contains \"{snippet}\"")]
fn then_stderr_contains(world: &mut TestWorld, snippet: String) {
    let stderr = world.stderr.contents();
    assert!(
        stderr.contains(&snippet),
        "stderr {stderr:?} did not contain {snippet:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/console.feature",
    name = "Test mode records the translated request"
)]
fn test_mode_records(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/console.feature",
    name = "Local mode runs plans in process"
)]
fn local_mode_runs(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/console.feature",
    name = "Detectors are refused for plans without detectors"
)]
fn capability_violation(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/console.feature",
    name = "Metadata typed at the prompt reaches later plans"
)]
fn interactive_metadata(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/console.feature",
    name = "A remote plan is followed to completion"
)]
fn remote_completion(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/console.feature",
    name = "Remote failures are shown verbatim"
)]
fn remote_failure(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/console.feature",
    name = "A refused submission is reported with its reason"
)]
fn refused_submission(world: TestWorld) {
    let _ = world;
}
