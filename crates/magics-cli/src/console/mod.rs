//! The interactive command loop.
//!
//! Each input line is split into shell-style words. Metadata commands and
//! `cs` are handled in-process; tool commands reach the queue server; any
//! other first word is a plan alias resolved against the active registry.

mod plans;
mod tools;

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use magics_config::{Config, OperationMode};
use magics_core::metadata::split_pair;
use magics_core::{JobRegistry, MetadataStore, Namespace, build_deployment, simulated_devices};
use magics_session::{AbortPolicy, JobState, QueueService, WatchOutcome};
use tracing::{debug, info, warn};

use crate::CLI_TARGET;
use crate::errors::AppError;
use crate::interrupt::{Foreground, InterruptHandler};
use crate::local::{LocalEngine, SimulatedEngine};
use crate::output::IoStreams;
use crate::remote::{PasswordPrompt, RemoteBackend};
use crate::render;
use tools::Tool;

const PROMPT: &str = "magics> ";

/// Result of one console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandOutcome {
    Done,
    Failed,
    Exit,
}

/// Where translated jobs go.
pub(crate) enum Backend {
    Remote(RemoteBackend),
    Local(Box<dyn LocalEngine>),
    Test,
}

pub(crate) struct Console {
    mode: OperationMode,
    namespace: Namespace,
    whitelist: JobRegistry,
    registry: JobRegistry,
    metadata: MetadataStore,
    backend: Backend,
    foreground: Foreground,
    poll_interval: Duration,
    interrupt_limit: u32,
    streams: IoStreams,
}

impl Console {
    /// Builds the console for the configured mode.
    ///
    /// Remote mode logs in first, prompting when credentials are missing,
    /// then loads the devices and plans the server allows.
    pub(crate) fn open<R: BufRead>(
        config: &Config,
        input: &mut R,
        streams: IoStreams,
        password_prompt: PasswordPrompt,
    ) -> Result<Self, AppError> {
        let whitelist =
            build_deployment(&config.deployment).map_err(|source| AppError::Deployment {
                deployment: config.deployment.clone(),
                source,
            })?;
        let backend = match config.mode() {
            OperationMode::Remote => {
                Backend::Remote(RemoteBackend::connect(
                    config,
                    input,
                    &streams,
                    password_prompt,
                )?)
            }
            OperationMode::Local => {
                Backend::Local(Box::new(SimulatedEngine::new(&simulated_devices())))
            }
            OperationMode::Test => Backend::Test,
        };
        Ok(Self::with_backend(config, whitelist, backend, streams))
    }

    pub(crate) fn with_backend(
        config: &Config,
        whitelist: JobRegistry,
        backend: Backend,
        streams: IoStreams,
    ) -> Self {
        let namespace = match &backend {
            Backend::Remote(_) => Namespace::new(),
            Backend::Local(_) | Backend::Test => Namespace::with_devices(simulated_devices()),
        };
        let mut console = Self {
            mode: config.mode(),
            namespace,
            registry: whitelist.clone(),
            whitelist,
            metadata: MetadataStore::new(),
            backend,
            foreground: Foreground::default(),
            poll_interval: config.poll_interval(),
            interrupt_limit: config.interrupt_limit,
            streams,
        };
        if let Some(service) = console.remote_service() {
            console.load_remote_lists(service.as_ref());
        }
        info!(
            target: CLI_TARGET,
            event = "console_ready",
            mode = %console.mode,
            deployment = console.whitelist.deployment(),
            plans = console.registry.len(),
            "console ready"
        );
        console
    }

    /// Handler for Ctrl-C sharing this console's foreground state.
    pub(crate) fn interrupt_handler(&self) -> InterruptHandler {
        let (service, policy) = match &self.backend {
            Backend::Remote(remote) => (Some(Arc::clone(remote.service())), remote.abort_policy()),
            Backend::Local(_) | Backend::Test => (None, AbortPolicy::default()),
        };
        InterruptHandler::new(
            self.foreground.clone(),
            service,
            policy,
            self.interrupt_limit,
            self.streams.clone(),
        )
    }

    #[cfg(test)]
    pub(crate) const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Reads and executes lines until `exit` or end of input.
    ///
    /// When the server refuses the session's token the user is asked to log
    /// in again before the next command is read.
    pub(crate) fn repl<R: BufRead>(&mut self, input: &mut R) -> Result<(), AppError> {
        loop {
            self.restore_login(input);
            self.streams.stdout.prompt(PROMPT);
            let mut line = String::new();
            let read = input
                .read_line(&mut line)
                .map_err(|source| AppError::ReadInput {
                    what: "command",
                    source,
                })?;
            if read == 0 {
                self.streams.stdout.line("");
                return Ok(());
            }
            if self.execute_line(&line) == CommandOutcome::Exit {
                return Ok(());
            }
        }
    }

    /// Executes `line` and, for a remote plan, waits for it to finish.
    pub(crate) fn run_once(&mut self, line: &str) -> CommandOutcome {
        let previous = self.foreground.job();
        let outcome = self.execute_line(line);
        if outcome != CommandOutcome::Done {
            return outcome;
        }
        let Backend::Remote(remote) = &mut self.backend else {
            return outcome;
        };
        let Some(job) = self.foreground.job() else {
            return outcome;
        };
        if previous.is_some_and(|earlier| earlier.ticket() == job.ticket()) {
            return outcome;
        }
        match remote.join(&job) {
            Ok(WatchOutcome::Finished(status)) if status.state() == JobState::Succeeded => {
                CommandOutcome::Done
            }
            Ok(_) => CommandOutcome::Failed,
            Err(error) => {
                warn!(target: CLI_TARGET, event = "join_failed", error = %error, "monitor failed");
                job.report_unknown(&error);
                CommandOutcome::Failed
            }
        }
    }

    /// Executes one input line.
    pub(crate) fn execute_line(&mut self, line: &str) -> CommandOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return CommandOutcome::Done;
        }
        let Some(words) = shlex::split(trimmed) else {
            self.streams
                .stderr
                .line(format!("Could not parse '{trimmed}': unbalanced quotes."));
            return CommandOutcome::Failed;
        };
        let Some((command, args)) = words.split_first() else {
            return CommandOutcome::Done;
        };
        debug!(target: CLI_TARGET, event = "command", command = %command, "dispatching command");

        match command.as_str() {
            "exit" | "quit" => CommandOutcome::Exit,
            "cs" => {
                self.streams
                    .stdout
                    .block(render::command_summary(&self.registry.descriptors()));
                CommandOutcome::Done
            }
            "show_md" => self.show_metadata(),
            "add_md" => self.add_metadata(args),
            "remove_md" => self.remove_metadata(args),
            name => match name.parse::<Tool>() {
                Ok(tool) => self.run_tool(tool, args),
                Err(_) => self.run_plan(trimmed, name, args),
            },
        }
    }

    /// Cancels background work and logs out.
    pub(crate) fn close(&mut self) {
        if let Backend::Remote(remote) = &mut self.backend {
            remote.close();
        }
    }

    fn restore_login<R: BufRead>(&self, input: &mut R) {
        let Backend::Remote(remote) = &self.backend else {
            return;
        };
        if !remote.needs_login() {
            return;
        }
        if let Err(error) = remote.relogin(input, &self.streams) {
            warn!(target: CLI_TARGET, event = "relogin_failed", error = %error, "still logged out");
            self.streams
                .stderr
                .line(format!("Still logged out: {error}"));
        }
    }

    fn remote_service(&self) -> Option<Arc<dyn QueueService>> {
        match &self.backend {
            Backend::Remote(remote) => Some(Arc::clone(remote.service())),
            Backend::Local(_) | Backend::Test => None,
        }
    }

    fn show_metadata(&self) -> CommandOutcome {
        let entries = self.metadata.entries();
        let mut lines = vec![String::from("Configured metadata:")];
        if entries.is_empty() {
            lines.push(String::from("  (none)"));
        }
        lines.extend(
            entries
                .iter()
                .map(|(key, value)| format!("  {key} = {value}")),
        );
        self.streams.stdout.block(lines);
        CommandOutcome::Done
    }

    fn add_metadata(&self, args: &[String]) -> CommandOutcome {
        if args.is_empty() {
            self.streams
                .stderr
                .line("add_md expects one or more key=value pairs.");
            return CommandOutcome::Failed;
        }
        let mut pairs = Vec::with_capacity(args.len());
        for arg in args {
            let Some(pair) = split_pair(arg) else {
                self.streams
                    .stderr
                    .line(format!("add_md expects key=value pairs, got '{arg}'."));
                return CommandOutcome::Failed;
            };
            pairs.push(pair);
        }
        for (key, value) in pairs {
            self.streams
                .stdout
                .line(format!("Setting metadata key '{key}' to '{value}'."));
            self.metadata.add_entry(key, value);
        }
        CommandOutcome::Done
    }

    fn remove_metadata(&self, args: &[String]) -> CommandOutcome {
        if args.is_empty() {
            self.streams
                .stderr
                .line("remove_md expects one or more keys.");
            return CommandOutcome::Failed;
        }
        for key in args {
            if self.metadata.remove_entry(key) {
                self.streams.stdout.line(format!("Removing entry '{key}'."));
            } else {
                self.streams
                    .stdout
                    .line(format!("No metadata entry named '{key}'."));
            }
        }
        CommandOutcome::Done
    }
}
