//! Test support utilities for console behavioural coverage.
//!
//! Supplies shared output buffers, a fixed configuration loader and a fake
//! queue server so step definitions and unit tests stay focused on their
//! assertions.

use std::ffi::OsString;
use std::io::{self, Cursor, Write};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result, ensure};
use httpmock::prelude::*;
use magics_config::{AuthMode, Config};
use serde_json::json;

use crate::errors::AppError;
use crate::output::IoStreams;
use crate::{ConfigLoader, run_with_loader};

/// Writer whose clones share one buffer.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub(crate) fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

pub(crate) const ITEM_UID: &str = "item-7f3a";

/// Queue server answering the endpoints a one-shot run touches.
pub(crate) struct FakeQueueServer {
    server: MockServer,
}

impl FakeQueueServer {
    /// Starts a server allowing the simulated devices and every plan.
    pub(crate) fn start() -> Self {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/devices/allowed");
            then.status(200).json_body(json!({
                "success": true,
                "devices_allowed": {
                    "SIM_det": {"is_movable": false, "is_readable": true},
                    "SIM_det1": {"is_movable": false, "is_readable": true},
                    "SIM_motor": {"is_movable": true, "is_readable": true},
                },
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/plans/allowed");
            then.status(200).json_body(json!({
                "success": true,
                "plans_allowed": {"count": {}, "mv": {}, "scan": {}},
            }));
        });
        Self { server }
    }

    /// Accepts submissions and records them as finished with `exit_status`.
    pub(crate) fn finishing_with(self, exit_status: &str, message: &str) -> Self {
        self.server.mock(|when, then| {
            when.method(POST).path("/api/item/execute");
            then.status(200).json_body(json!({
                "success": true,
                "msg": "",
                "item": {"item_uid": ITEM_UID, "name": "count"},
            }));
        });
        self.server.mock(|when, then| {
            when.method(GET).path("/api/status");
            then.status(200).json_body(json!({
                "msg": "queue server 0.0.21",
                "manager_state": "idle",
                "items_in_queue": 0,
                "items_in_history": 1,
                "worker_environment_exists": true,
                "worker_environment_state": "idle",
            }));
        });
        self.server.mock(|when, then| {
            when.method(GET).path("/api/history/get");
            then.status(200).json_body(json!({
                "success": true,
                "items": [{
                    "name": "count",
                    "item_uid": ITEM_UID,
                    "user": "operator",
                    "result": {
                        "exit_status": exit_status,
                        "msg": message,
                        "run_uids": ["run-0001"],
                        "time_start": 0.0,
                        "time_stop": 1.5,
                    },
                }],
            }));
        });
        self
    }

    /// Refuses every submission with `message`.
    pub(crate) fn refusing(self, message: &str) -> Self {
        self.server.mock(|when, then| {
            when.method(POST).path("/api/item/execute");
            then.status(200)
                .json_body(json!({"success": false, "msg": message}));
        });
        self
    }

    pub(crate) fn url(&self) -> String {
        self.server.base_url()
    }

    pub(crate) const fn server(&self) -> &MockServer {
        &self.server
    }
}

/// Console run driven through [`run_with_loader`].
pub(crate) struct TestWorld {
    pub(crate) config: Config,
    pub(crate) server: Option<FakeQueueServer>,
    pub(crate) input: String,
    pub(crate) stdout: SharedBuffer,
    pub(crate) stderr: SharedBuffer,
    pub(crate) exit_code: Option<ExitCode>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self {
            config: Config {
                auth_mode: AuthMode::Anonymous,
                retry_attempts: 1,
                poll_interval_ms: 10,
                ..Config::default()
            },
            server: None,
            input: String::new(),
            stdout: SharedBuffer::default(),
            stderr: SharedBuffer::default(),
            exit_code: None,
        }
    }
}

impl TestWorld {
    pub(crate) fn use_server(&mut self, server: FakeQueueServer) {
        self.config.server_url = server.url();
        self.server = Some(server);
    }

    pub(crate) fn type_line(&mut self, line: &str) {
        self.input.push_str(line);
        self.input.push('\n');
    }

    pub(crate) fn run(&mut self, command: &str) -> Result<()> {
        let words = shlex::split(command).context("command words parse")?;
        let mut args = vec![OsString::from("magics")];
        args.extend(words.into_iter().map(OsString::from));

        self.stdout = SharedBuffer::default();
        self.stderr = SharedBuffer::default();
        let streams = IoStreams::new(self.stdout.clone(), self.stderr.clone());
        let mut input = Cursor::new(self.input.clone().into_bytes());
        let loader = StaticConfigLoader::new(self.config.clone());
        self.exit_code = Some(run_with_loader(args, &mut input, streams, &loader));
        Ok(())
    }

    pub(crate) fn assert_exit_code(&self, expected: u8) -> Result<()> {
        let exit = self.exit_code.context("exit code recorded")?;
        ensure!(
            exit == ExitCode::from(expected),
            "expected exit code {expected}, got {exit:?}; stderr: {}",
            self.stderr.contents()
        );
        Ok(())
    }
}
