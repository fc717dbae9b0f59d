//! Unit tests for the session handler.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rstest::rstest;
use serde_json::{Value, json};

use super::*;
use crate::tests::MockTransport;

const LOGIN: &str = "/api/auth/provider/ldap/token";

fn settings() -> SessionSettings {
    SessionSettings::new("ldap").with_policy(RetryPolicy::new(3, Duration::ZERO))
}

fn grant(access: &str, expires_in: u64) -> Value {
    json!({
        "access_token": access,
        "refresh_token": "refresh-1",
        "expires_in": expires_in,
    })
}

fn transient() -> TransportError {
    TransportError::Transient {
        message: String::from("connection reset"),
    }
}

fn expect_login(mock: &mut MockTransport, expires_in: u64) {
    mock.expect_execute()
        .withf(|request| request.path() == LOGIN)
        .times(1)
        .returning(move |_| Ok(grant("access-1", expires_in)));
}

fn expect_logout(mock: &mut MockTransport) {
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::LOGOUT)
        .times(1)
        .returning(|_| Ok(json!({ "success": true })));
}

fn authenticated(mock: MockTransport) -> SessionHandler<MockTransport> {
    let handler = SessionHandler::new(mock, settings());
    handler
        .authenticate(Credentials::new("operator", "secret"))
        .expect("login succeeds");
    handler
}

#[test]
fn disconnected_sessions_send_nothing() {
    let handler = SessionHandler::new(MockTransport::new(), settings());
    let error = handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect_err("session is disconnected");
    assert_eq!(error, SessionError::Disconnected);
}

#[test]
fn authentication_activates_the_session() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    assert_eq!(handler.state(), ConnectionState::Active);
    assert_eq!(handler.username().as_deref(), Some("operator"));
}

#[test]
fn refused_logins_are_not_retried() {
    let mut mock = MockTransport::new();
    mock.expect_execute()
        .withf(|request| request.path() == LOGIN)
        .times(1)
        .returning(|_| {
            Err(TransportError::Unauthorized {
                status: 401,
                message: String::from("Incorrect username or password"),
            })
        });

    let handler = SessionHandler::new(mock, settings());
    let error = handler
        .authenticate(Credentials::new("operator", "wrong"))
        .expect_err("login is refused");
    assert!(matches!(error, AuthError::InvalidCredentials { .. }));
    assert_eq!(handler.state(), ConnectionState::Disconnected);
}

#[test]
fn unreachable_hosts_are_reported_after_retries() {
    let mut mock = MockTransport::new();
    mock.expect_execute()
        .withf(|request| request.path() == LOGIN)
        .times(3)
        .returning(|_| Err(transient()));

    let handler = SessionHandler::new(mock, settings());
    let error = handler
        .authenticate(Credentials::new("operator", "secret"))
        .expect_err("host is unreachable");
    assert!(matches!(error, AuthError::Unreachable { .. }));
    assert_eq!(handler.state(), ConnectionState::Disconnected);
}

#[test]
fn transient_failures_are_bounded() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::STATUS)
        .times(3)
        .returning(|_| Err(transient()));
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    let error = handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect_err("retries are exhausted");
    assert!(matches!(
        error,
        SessionError::TransientNetwork { attempts: 3, .. }
    ));
    assert!(error.is_connectivity());
    assert_eq!(handler.state(), ConnectionState::Degraded);
}

#[test]
fn successful_retries_restore_the_session() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    let calls = AtomicUsize::new(0);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::STATUS)
        .times(2)
        .returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(transient())
            } else {
                Ok(json!({ "manager_state": "idle" }))
            }
        });
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    let response = handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect("second attempt succeeds");
    assert_eq!(response.get("manager_state"), Some(&json!("idle")));
    assert_eq!(handler.state(), ConnectionState::Active);
}

#[rstest]
#[case::unauthorised(
    TransportError::Unauthorized { status: 403, message: String::from("forbidden") },
    SessionError::FatalAuth { message: String::from("forbidden") },
)]
#[case::rejected(
    TransportError::Rejected { status: 422, message: String::from("invalid plan") },
    SessionError::RemoteRejection { message: String::from("invalid plan") },
)]
fn non_transient_failures_propagate_at_once(
    #[case] failure: TransportError,
    #[case] expected: SessionError,
) {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::EXECUTE)
        .times(1)
        .returning(move |_| Err(failure.clone()));
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    let error = handler
        .send(ApiRequest::post_json(endpoints::EXECUTE, json!({})))
        .expect_err("request fails");
    assert_eq!(error, expected);
}

#[test]
fn unsuccessful_responses_carry_the_server_message() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::EXECUTE)
        .times(1)
        .returning(|_| Ok(json!({ "success": false, "msg": "Plan 'scan' is not allowed" })));
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    let error = handler
        .send(ApiRequest::post_json(endpoints::EXECUTE, json!({})))
        .expect_err("server declines");
    assert_eq!(error.to_string(), "Plan 'scan' is not allowed");
}

#[test]
fn requests_carry_the_access_token() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    mock.expect_execute()
        .withf(|request| {
            request.path() == endpoints::STATUS && request.bearer() == Some("access-1")
        })
        .times(1)
        .returning(|_| Ok(json!({})));
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect("status succeeds");
}

#[test]
fn anonymous_sessions_send_no_token() {
    let mut mock = MockTransport::new();
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::STATUS && request.bearer().is_none())
        .times(1)
        .returning(|_| Ok(json!({})));

    let handler = SessionHandler::new(mock, settings());
    handler.connect_anonymous();
    handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect("status succeeds");
}

#[test]
fn concurrent_requests_refresh_once() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 1);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::REFRESH)
        .times(1)
        .returning(|_| {
            thread::sleep(Duration::from_millis(50));
            Ok(grant("access-2", 3600))
        });
    mock.expect_execute()
        .withf(|request| {
            request.path() == endpoints::STATUS && request.bearer() == Some("access-2")
        })
        .times(2)
        .returning(|_| Ok(json!({})));
    expect_logout(&mut mock);

    let handler = Arc::new(authenticated(mock));
    let barrier = Arc::new(Barrier::new(2));
    let workers: Vec<_> = (0..2)
        .map(|_| {
            let worker_handler = Arc::clone(&handler);
            let worker_barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                worker_barrier.wait();
                worker_handler.send(ApiRequest::get(endpoints::STATUS))
            })
        })
        .collect();
    for worker in workers {
        worker
            .join()
            .expect("worker thread")
            .expect("status succeeds");
    }
}

#[test]
fn rejected_refresh_logs_in_again() {
    let mut mock = MockTransport::new();
    let logins = AtomicUsize::new(0);
    mock.expect_execute()
        .withf(|request| request.path() == LOGIN)
        .times(2)
        .returning(move |_| {
            let expires_in = if logins.fetch_add(1, Ordering::SeqCst) == 0 { 1 } else { 3600 };
            Ok(grant("access-1", expires_in))
        });
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::REFRESH)
        .times(1)
        .returning(|_| {
            Err(TransportError::Unauthorized {
                status: 401,
                message: String::from("refresh token expired"),
            })
        });
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::STATUS)
        .times(1)
        .returning(|_| Ok(json!({})));
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect("fallback login succeeds");
    assert_eq!(handler.state(), ConnectionState::Active);
}

#[test]
fn failed_fallback_login_disconnects() {
    let mut mock = MockTransport::new();
    let logins = AtomicUsize::new(0);
    mock.expect_execute()
        .withf(|request| request.path() == LOGIN)
        .times(2)
        .returning(move |_| {
            if logins.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(grant("access-1", 1))
            } else {
                Err(TransportError::Unauthorized {
                    status: 401,
                    message: String::from("account locked"),
                })
            }
        });
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::REFRESH)
        .times(1)
        .returning(|_| {
            Err(TransportError::Unauthorized {
                status: 401,
                message: String::from("refresh token expired"),
            })
        });

    let handler = authenticated(mock);
    let error = handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect_err("fallback login fails");
    assert!(matches!(
        error,
        SessionError::Auth(AuthError::InvalidCredentials { .. })
    ));
    assert_eq!(handler.state(), ConnectionState::Disconnected);
    assert!(handler.login_required());
}

#[test]
fn refused_tokens_require_a_new_login() {
    let mut mock = MockTransport::new();
    mock.expect_execute()
        .withf(|request| request.path() == LOGIN)
        .times(2)
        .returning(|_| Ok(grant("access-1", 900)));
    let calls = AtomicUsize::new(0);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::STATUS)
        .times(2)
        .returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::Unauthorized {
                    status: 401,
                    message: String::from("token revoked"),
                })
            } else {
                Ok(json!({ "manager_state": "idle" }))
            }
        });
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    let error = handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect_err("token is refused");
    assert_eq!(
        error,
        SessionError::FatalAuth {
            message: String::from("token revoked")
        }
    );
    assert_eq!(handler.state(), ConnectionState::Disconnected);
    assert!(handler.login_required());

    let refused = handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect_err("nothing is sent until the next login");
    assert_eq!(refused, SessionError::Disconnected);

    handler
        .authenticate(Credentials::new("operator", "secret"))
        .expect("second login succeeds");
    assert!(!handler.login_required());
    handler
        .send(ApiRequest::get(endpoints::STATUS))
        .expect("status succeeds after the new login");
    assert_eq!(handler.state(), ConnectionState::Active);
}

#[test]
fn forbidden_requests_keep_the_session() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::RE_STOP)
        .times(1)
        .returning(|_| {
            Err(TransportError::Unauthorized {
                status: 403,
                message: String::from("not permitted"),
            })
        });
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    handler
        .send(ApiRequest::post(endpoints::RE_STOP))
        .expect_err("request is forbidden");
    assert_eq!(handler.state(), ConnectionState::Active);
    assert!(!handler.login_required());
}

#[test]
fn unconfirmed_requests_are_not_retried() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::EXECUTE)
        .times(1)
        .returning(|_| {
            Err(TransportError::Unconfirmed {
                message: String::from("operation timed out"),
            })
        });
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    let error = handler
        .send(ApiRequest::post_json(endpoints::EXECUTE, json!({})).without_replay())
        .expect_err("no answer arrived");
    assert!(matches!(
        error,
        SessionError::Protocol(TransportError::Unconfirmed { .. })
    ));
    assert_eq!(handler.state(), ConnectionState::Active);
}

#[test]
fn close_logs_out_once() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    handler.close();
    handler.close();
    assert_eq!(handler.state(), ConnectionState::Disconnected);
}

#[test]
fn dropping_the_handler_logs_out() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    expect_logout(&mut mock);

    let handler = authenticated(mock);
    drop(handler);
}

#[test]
fn logout_failures_are_ignored() {
    let mut mock = MockTransport::new();
    expect_login(&mut mock, 900);
    mock.expect_execute()
        .withf(|request| request.path() == endpoints::LOGOUT)
        .times(1)
        .returning(|_| Err(transient()));

    let handler = authenticated(mock);
    handler.close();
    assert_eq!(handler.state(), ConnectionState::Disconnected);
}

#[test]
fn credentials_hide_the_password() {
    let rendered = format!("{:?}", Credentials::new("operator", "secret"));
    assert!(rendered.contains("operator"));
    assert!(!rendered.contains("secret"));
}
