//! Runner tests and behavioural coverage for the console.

pub(crate) mod support;

mod behaviour;

use std::io::Cursor;
use std::process::ExitCode;

use httpmock::prelude::*;
use magics_config::{Config, OperationMode};
use rstest::rstest;
use serde_json::json;

use self::support::{FakeQueueServer, SharedBuffer, StaticConfigLoader};
use crate::output::IoStreams;
use crate::remote::PASSWORD_ENV;
use crate::run_with_loader;

struct Outcome {
    exit: ExitCode,
    stdout: String,
    stderr: String,
}

fn run(config: Config, args: &[&str], input: &str) -> Outcome {
    let stdout = SharedBuffer::default();
    let stderr = SharedBuffer::default();
    let streams = IoStreams::new(stdout.clone(), stderr.clone());
    let mut input = Cursor::new(input.as_bytes().to_vec());
    let loader = StaticConfigLoader::new(config);
    let exit = run_with_loader(
        args.iter().map(std::ffi::OsString::from),
        &mut input,
        streams,
        &loader,
    );
    Outcome {
        exit,
        stdout: stdout.contents(),
        stderr: stderr.contents(),
    }
}

fn test_config() -> Config {
    Config {
        mode: OperationMode::Test,
        ..Config::default()
    }
}

#[rstest]
#[case("--help")]
#[case("--version")]
fn help_and_version_go_to_stdout(#[case] flag: &str) {
    let outcome = run(test_config(), &["magics", flag], "");

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(!outcome.stdout.is_empty());
    assert!(outcome.stderr.is_empty());
}

#[test]
fn unknown_deployments_stop_startup() {
    let config = Config {
        deployment: String::from("nowhere"),
        ..test_config()
    };

    let outcome = run(config, &["magics", "count", "SIM_det"], "");

    assert_eq!(outcome.exit, ExitCode::from(2));
    assert!(outcome.stderr.contains("unknown deployment 'nowhere'"));
}

#[test]
fn invalid_server_urls_stop_startup() {
    let config = Config {
        server_url: String::from("not a url"),
        ..Config::default()
    };

    let outcome = run(config, &["magics"], "");

    assert_eq!(outcome.exit, ExitCode::from(2));
    assert!(outcome.stderr.contains("invalid server url"));
}

#[test]
fn failed_one_shot_commands_exit_with_one() {
    let outcome = run(test_config(), &["magics", "teleport", "SIM_motor"], "");

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("Failed to run the provided plan."));
}

#[test]
fn interactive_sessions_exit_cleanly_at_end_of_input() {
    let outcome = run(test_config(), &["magics"], "count SIM_det\nshow_md\n");

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("Plan recorded for testing"));
    assert!(outcome.stdout.contains("Configured metadata:"));
}

/// Accepts `password` with a login that hands out `token`.
fn accept_login(server: &MockServer, password: &str, token: &str) {
    let body = format!("password={password}");
    let grant = json!({"access_token": token, "expires_in": 3600});
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/auth/provider/ldap_local/token")
            .body_contains(body.as_str());
        then.status(200).json_body(grant);
    });
}

#[test]
fn refused_tokens_prompt_for_a_new_login() {
    if std::env::var_os(PASSWORD_ENV).is_some() {
        return;
    }
    let queue = FakeQueueServer::start();
    let server = queue.server();
    accept_login(server, "first", "token-1");
    accept_login(server, "second", "token-2");
    server.mock(|when, then| {
        when.method(GET)
            .path("/api/status")
            .header("authorization", "Bearer token-1");
        then.status(401).json_body(json!({"detail": "token revoked"}));
    });
    let status = server.mock(|when, then| {
        when.method(GET)
            .path("/api/status")
            .header("authorization", "Bearer token-2");
        then.status(200).json_body(json!({
            "msg": "queue server 0.0.21",
            "manager_state": "idle",
        }));
    });
    let config = Config {
        server_url: queue.url(),
        auth_provider: String::from("ldap_local"),
        username: String::from("operator"),
        retry_attempts: 1,
        ..Config::default()
    };

    let outcome = run(
        config,
        &["magics"],
        "first\nquery_state\nsecond\nquery_state\n",
    );

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(outcome.stderr.contains("token revoked"));
    assert!(outcome.stderr.contains("please log in again"));
    assert!(outcome.stdout.contains("Manager: idle"));
    assert_eq!(outcome.stdout.matches("Password: ").count(), 2);
    status.assert();
}

#[test]
fn abandoned_logins_leave_the_console_usable() {
    if std::env::var_os(PASSWORD_ENV).is_some() {
        return;
    }
    let queue = FakeQueueServer::start();
    let server = queue.server();
    accept_login(server, "first", "token-1");
    server.mock(|when, then| {
        when.method(GET).path("/api/status");
        then.status(401).json_body(json!({"detail": "token revoked"}));
    });
    let config = Config {
        server_url: queue.url(),
        auth_provider: String::from("ldap_local"),
        username: String::from("operator"),
        retry_attempts: 1,
        ..Config::default()
    };

    let outcome = run(config, &["magics"], "first\nquery_state\n");

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(outcome.stderr.contains("Still logged out: no password was provided"));
}
