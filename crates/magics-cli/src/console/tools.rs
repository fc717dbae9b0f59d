//! Tool commands that query or control the queue server.

use std::fmt::Display;
use std::thread;

use magics_core::{NamespaceValue, keys};
use magics_session::{
    AbortError, EnvironmentAction, PauseMode, QueueService, SessionError, StatusSnapshot,
    abort_job,
};
use strum::{EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::{info, warn};

use super::{Backend, CommandOutcome, Console};
use crate::CLI_TARGET;
use crate::render;

/// Commands served by the queue server rather than the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(super) enum Tool {
    QueryState,
    QueryHistory,
    Pause,
    Resume,
    Stop,
    Abort,
    Requery,
    WaitForIdle,
    ReloadDevices,
    ReloadPlans,
    ReloadEnvironment,
}

/// Status polls made while waiting for a control request to take effect.
const WAIT_POLLS: u32 = 600;

#[derive(Debug, Error)]
enum WaitError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("the server did not reach the expected state in time")]
    TimedOut,
}

impl Console {
    pub(super) fn run_tool(&mut self, tool: Tool, args: &[String]) -> CommandOutcome {
        let Some(service) = self.remote_service() else {
            let name: &'static str = tool.into();
            self.streams.stderr.line(format!(
                "'{name}' needs the queue server, but the console runs in {} mode.",
                self.mode
            ));
            return CommandOutcome::Failed;
        };
        let service = service.as_ref();
        match tool {
            Tool::QueryState => self.query_state(service),
            Tool::QueryHistory => self.query_history(service),
            Tool::Pause => self.pause(service, args),
            Tool::Resume => self.resume(service),
            Tool::Stop => self.stop(service),
            Tool::Abort => self.abort(service),
            Tool::Requery => self.requery(),
            Tool::WaitForIdle => self.wait_for_idle(service, args),
            Tool::ReloadDevices => self.reload_devices(service),
            Tool::ReloadPlans => self.reload_plans(service),
            Tool::ReloadEnvironment => self.reload_environment(service, args),
        }
    }

    /// Loads the server's device and plan lists; failures only warn.
    pub(super) fn load_remote_lists(&mut self, service: &dyn QueueService) {
        if let Err(error) = self.load_devices(service) {
            warn!(target: CLI_TARGET, event = "devices_unavailable", error = %error, "device list not loaded");
            self.streams
                .stderr
                .line(format!("Failed to request available devices: {error}"));
        }
        if let Err(error) = self.load_plans(service) {
            warn!(target: CLI_TARGET, event = "plans_unavailable", error = %error, "plan list not loaded");
            self.streams
                .stderr
                .line(format!("Failed to request available plans: {error}"));
        }
    }

    fn load_devices(&self, service: &dyn QueueService) -> Result<usize, SessionError> {
        let devices = service.allowed_devices()?;
        let names = devices
            .iter()
            .map(|device| device.name().to_owned())
            .collect();
        let count = devices.len();
        self.namespace.replace_devices(devices);
        self.namespace
            .add_to_namespace(keys::ALLOWED_DEVICES, NamespaceValue::Names(names));
        info!(target: CLI_TARGET, event = "devices_loaded", count, "device list loaded");
        Ok(count)
    }

    fn load_plans(&mut self, service: &dyn QueueService) -> Result<usize, SessionError> {
        let allowed = service.allowed_plans()?;
        self.registry = self.whitelist.restrict_to(&allowed);
        self.namespace
            .add_to_namespace(keys::ALLOWED_PLANS, NamespaceValue::Names(allowed));
        info!(
            target: CLI_TARGET,
            event = "plans_loaded",
            available = self.registry.len(),
            whitelisted = self.whitelist.len(),
            "plan list loaded"
        );
        Ok(self.registry.len())
    }

    fn query_state(&self, service: &dyn QueueService) -> CommandOutcome {
        match service.status() {
            Ok(state) => {
                self.streams.stdout.block(render::status_snapshot(&state));
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to query the server state", &error),
        }
    }

    fn query_history(&self, service: &dyn QueueService) -> CommandOutcome {
        match service.history() {
            Ok(items) if items.is_empty() => {
                self.streams.stdout.line("History is currently empty.");
                CommandOutcome::Done
            }
            Ok(items) => {
                self.streams.stdout.block(render::history(&items));
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to query the server history", &error),
        }
    }

    fn pause(&self, service: &dyn QueueService, args: &[String]) -> CommandOutcome {
        let mode = match args.first().map(String::as_str) {
            None | Some("immediate") => PauseMode::Immediate,
            Some("deferred") => PauseMode::Deferred,
            Some(other) => {
                self.streams.stderr.line(format!(
                    "Unknown pause mode '{other}': use 'immediate' or 'deferred'."
                ));
                return CommandOutcome::Failed;
            }
        };
        let label = match mode {
            PauseMode::Immediate => "Immediate",
            PauseMode::Deferred => "Deferred",
        };
        self.streams
            .stdout
            .line(format!("{label} plan pause requested."));

        let state = match service.status() {
            Ok(state) => state,
            Err(error) => return self.tool_failure("Failed to pause plan", &error),
        };
        if state.is_paused() {
            self.streams.stdout.line("Plan paused successfully.");
            return CommandOutcome::Done;
        }
        if !is_executing(&state) {
            self.streams
                .stderr
                .line("Failed to pause plan: No plan is running.");
            return CommandOutcome::Failed;
        }
        if let Err(error) = service.pause(mode) {
            return self.tool_failure("Failed to pause plan execution", &error);
        }
        match self.wait_until(service, |state| state.is_paused() || state.is_idle()) {
            Ok(()) => {
                self.streams.stdout.line("Plan paused successfully.");
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to pause plan", &error),
        }
    }

    fn resume(&self, service: &dyn QueueService) -> CommandOutcome {
        if let Err(error) = service.resume() {
            return self.tool_failure("Failed to resume plan execution", &error);
        }
        match self.wait_until(service, |state| !state.is_paused()) {
            Ok(()) => {
                self.streams.stdout.line("Plan resumed successfully.");
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to resume plan", &error),
        }
    }

    fn stop(&self, service: &dyn QueueService) -> CommandOutcome {
        let state = match service.status() {
            Ok(state) => state,
            Err(error) => return self.tool_failure("Failed to stop plan", &error),
        };
        if !state.is_paused() {
            if !is_executing(&state) {
                self.streams
                    .stderr
                    .line("Failed to stop plan: No plan is running.");
                return CommandOutcome::Failed;
            }
            if let Err(error) = service.pause(PauseMode::Immediate) {
                return self.tool_failure("Failed to pause plan execution", &error);
            }
            if let Err(error) = self.wait_until(service, |state| state.is_paused() || state.is_idle())
            {
                return self.tool_failure("Failed to stop plan", &error);
            }
        }
        if let Err(error) = service.stop() {
            return self.tool_failure("Failed to stop plan execution", &error);
        }
        match self.wait_until(service, StatusSnapshot::is_idle) {
            Ok(()) => {
                self.streams.stdout.line("Plan stopped successfully.");
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to stop plan", &error),
        }
    }

    fn abort(&self, service: &dyn QueueService) -> CommandOutcome {
        let Some(job) = self.foreground.active_job() else {
            self.streams
                .stderr
                .line("Failed to abort plan execution: No submitted plan is active.");
            return CommandOutcome::Failed;
        };
        let Backend::Remote(remote) = &self.backend else {
            return CommandOutcome::Failed;
        };
        let correlation_id = job.ticket().correlation_id();
        self.streams
            .stdout
            .line(format!("[{correlation_id}] abort requested"));
        match abort_job(service, &job, &remote.abort_policy()) {
            Ok(_) => CommandOutcome::Done,
            Err(AbortError::AlreadyFinished { .. }) => {
                self.streams
                    .stdout
                    .line(format!("[{correlation_id}] already finished"));
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to abort plan execution", &error),
        }
    }

    fn requery(&mut self) -> CommandOutcome {
        let Some(job) = self.foreground.job() else {
            self.streams
                .stderr
                .line("No plan has been submitted in this session.");
            return CommandOutcome::Failed;
        };
        let correlation_id = job.ticket().correlation_id().clone();
        if job.is_terminal() {
            self.streams
                .stdout
                .line(format!("[{correlation_id}] {}", job.status().state()));
            return CommandOutcome::Done;
        }
        let Backend::Remote(remote) = &mut self.backend else {
            return CommandOutcome::Failed;
        };
        if remote.is_following(&job) {
            self.streams
                .stdout
                .line(format!("[{correlation_id}] is already being followed."));
            return CommandOutcome::Done;
        }
        match remote.follow(&job) {
            Ok(()) => {
                self.streams
                    .stdout
                    .line(format!("[{correlation_id}] following again"));
                CommandOutcome::Done
            }
            Err(error) => {
                job.report_unknown(&error);
                CommandOutcome::Failed
            }
        }
    }

    fn wait_for_idle(&self, service: &dyn QueueService, args: &[String]) -> CommandOutcome {
        let soft = args.first().is_some_and(|arg| arg == "soft");
        self.streams.stdout.line(if soft {
            "Waiting for the queue server to become idle. Ctrl+C leaves wait mode."
        } else {
            "Waiting for the queue server to become idle. Ctrl+C aborts the running plan."
        });
        let cancel = self.foreground.begin_wait(soft);
        let outcome = loop {
            if cancel.is_cancelled() {
                break CommandOutcome::Done;
            }
            let state = match service.status() {
                Ok(state) => state,
                Err(error) => break self.tool_failure("Failed to query the server state", &error),
            };
            if state.is_idle() && !self.has_running_monitors() {
                self.streams.stdout.line("Queue server is idle.");
                break CommandOutcome::Done;
            }
            cancel.wait(self.poll_interval);
        };
        self.foreground.end_wait();
        outcome
    }

    fn reload_devices(&self, service: &dyn QueueService) -> CommandOutcome {
        match self.load_devices(service) {
            Ok(count) => {
                self.streams.stdout.line(format!("Loaded {count} devices."));
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to request available devices", &error),
        }
    }

    fn reload_plans(&mut self, service: &dyn QueueService) -> CommandOutcome {
        match self.load_plans(service) {
            Ok(count) => {
                self.streams.stdout.line(format!(
                    "{count} of {} whitelisted plans are available.",
                    self.whitelist.len()
                ));
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to request available plans", &error),
        }
    }

    fn reload_environment(&self, service: &dyn QueueService, args: &[String]) -> CommandOutcome {
        let force = args.first().is_some_and(|arg| arg == "force");
        let state = match service.status() {
            Ok(state) => state,
            Err(error) => return self.tool_failure("Failed to query the server state", &error),
        };
        if state.worker_environment_exists {
            let (message, action) = if force {
                ("Destroying environment...", EnvironmentAction::Destroy)
            } else {
                ("Closing environment...", EnvironmentAction::Close)
            };
            self.streams.stdout.line(message);
            if let Err(error) = service.environment(action) {
                return self.tool_failure("Failed to request environment closure", &error);
            }
            if let Err(error) =
                self.wait_until(service, |state| state.is_idle() && !state.worker_environment_exists)
            {
                return self.tool_failure("Failed to close environment", &error);
            }
        }
        self.streams.stdout.line("Opening environment...");
        if let Err(error) = service.environment(EnvironmentAction::Open) {
            return self.tool_failure("Failed to request environment opening", &error);
        }
        match self.wait_until(service, |state| state.is_idle() && state.worker_environment_exists) {
            Ok(()) => {
                self.streams.stdout.line("Environment is ready.");
                CommandOutcome::Done
            }
            Err(error) => self.tool_failure("Failed to open environment", &error),
        }
    }

    fn has_running_monitors(&self) -> bool {
        match &self.backend {
            Backend::Remote(remote) => remote.has_running_monitors(),
            Backend::Local(_) | Backend::Test => false,
        }
    }

    fn wait_until(
        &self,
        service: &dyn QueueService,
        reached: impl Fn(&StatusSnapshot) -> bool,
    ) -> Result<(), WaitError> {
        for _ in 0..WAIT_POLLS {
            if reached(&service.status()?) {
                return Ok(());
            }
            thread::sleep(self.poll_interval);
        }
        Err(WaitError::TimedOut)
    }

    fn tool_failure(&self, context: &str, error: &dyn Display) -> CommandOutcome {
        self.streams.stderr.line(format!("{context}: {error}"));
        CommandOutcome::Failed
    }
}

fn is_executing(state: &StatusSnapshot) -> bool {
    state.manager_state == "executing_queue"
}
