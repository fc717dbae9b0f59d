//! Runtime of the `magics` console.
//!
//! The module owns argument parsing, configuration bootstrapping, telemetry
//! and the console lifecycle. It is exercised both from the binary
//! entrypoint and from tests where configuration loading and the IO streams
//! are substituted.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::{info, warn};

mod cli;
mod config;
mod console;
mod errors;
mod interrupt;
mod local;
mod output;
mod remote;
mod render;
mod reporter;
mod telemetry;

#[cfg(test)]
mod tests;

use cli::Cli;
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
use console::{CommandOutcome, Console};
use errors::AppError;
use interrupt::InterruptWatcher;
use output::IoStreams;
pub use remote::PasswordPrompt;

/// Tracing target for console events.
pub(crate) const CLI_TARGET: &str = "magics::cli";

/// CLI flags recognised by the configuration loader.
///
/// MAINTENANCE: This list must be kept in sync with the fields of
/// `magics_config::Config`. When adding new configuration options, update
/// this array accordingly.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--mode",
    "--server-url",
    "--auth-provider",
    "--auth-mode",
    "--username",
    "--deployment",
    "--retry-attempts",
    "--retry-backoff-ms",
    "--request-timeout-ms",
    "--poll-interval-ms",
    "--refresh-margin-secs",
    "--status-source",
    "--interrupt-limit",
    "--log-filter",
    "--log-format",
];

struct CliRunner<'a, L: ConfigLoader> {
    streams: IoStreams,
    loader: &'a L,
    password_prompt: PasswordPrompt,
}

impl<'a, L: ConfigLoader> CliRunner<'a, L> {
    const fn new(streams: IoStreams, loader: &'a L, password_prompt: PasswordPrompt) -> Self {
        Self {
            streams,
            loader,
            password_prompt,
        }
    }

    fn run<I, R>(&self, args: I, input: &mut R) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
        R: BufRead,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);

        let cli = match Cli::try_parse_from(prepare_cli_arguments(&args, &split)) {
            Ok(cli) => cli,
            Err(error)
                if matches!(
                    error.kind(),
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
                ) =>
            {
                self.streams
                    .stdout
                    .line(error.render().to_string().trim_end());
                return ExitCode::SUCCESS;
            }
            Err(error) => return self.fail(&AppError::CliUsage(error)),
        };

        match self.start(&cli, &split, input) {
            Ok(exit_code) => exit_code,
            Err(error) => self.fail(&error),
        }
    }

    fn start<R: BufRead>(
        &self,
        cli: &Cli,
        split: &ConfigArgumentSplit,
        input: &mut R,
    ) -> Result<ExitCode, AppError> {
        let config = self.loader.load(&split.config_arguments)?;
        telemetry::initialise(&config)?;
        info!(
            target: CLI_TARGET,
            event = "startup",
            mode = %config.mode(),
            deployment = %config.deployment,
            "starting console"
        );

        let mut console = Console::open(
            &config,
            input,
            self.streams.clone(),
            self.password_prompt,
        )?;
        let watcher = InterruptWatcher::install(console.interrupt_handler())?;
        let exit_code = match cli.one_shot() {
            Some(line) => match console.run_once(&line) {
                CommandOutcome::Failed => ExitCode::FAILURE,
                CommandOutcome::Done | CommandOutcome::Exit => ExitCode::SUCCESS,
            },
            None => {
                console.repl(input)?;
                ExitCode::SUCCESS
            }
        };
        drop(watcher);
        console.close();
        info!(target: CLI_TARGET, event = "shutdown", "console closed");
        Ok(exit_code)
    }

    fn fail(&self, error: &AppError) -> ExitCode {
        warn!(target: CLI_TARGET, event = "startup_failed", error = %error, "console did not start");
        self.streams.stderr.line(error);
        error.exit_code()
    }
}

fn prepare_cli_arguments(args: &[OsString], split: &ConfigArgumentSplit) -> Vec<OsString> {
    let mut cli_arguments: Vec<OsString> = Vec::new();
    if let Some(first) = args.first() {
        cli_arguments.push(first.clone());
    }
    if let Some(command) = args.get(split.command_start..) {
        cli_arguments.extend(command.iter().cloned());
    }
    cli_arguments
}

/// Runs the console using the provided arguments and IO handles.
///
/// Without command words the console reads commands from `input` until
/// `exit` or end of input. With command words it runs that single command,
/// waits for a submitted plan to finish, and exits with `0` on success, `1`
/// when the command or plan failed, and `2` when startup failed.
///
/// A password missing from the environment is read from `input`.
#[must_use]
pub fn run<I, R, W, E>(args: I, input: R, stdout: W, stderr: E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write + Send + 'static,
    E: Write + Send + 'static,
{
    run_with_prompt(args, input, stdout, stderr, PasswordPrompt::Input)
}

/// Runs the console like [`run`], reading a missing password as
/// `password_prompt` selects.
#[must_use]
pub fn run_with_prompt<I, R, W, E>(
    args: I,
    mut input: R,
    stdout: W,
    stderr: E,
    password_prompt: PasswordPrompt,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write + Send + 'static,
    E: Write + Send + 'static,
{
    let streams = IoStreams::new(stdout, stderr);
    CliRunner::new(streams, &OrthoConfigLoader, password_prompt).run(args, &mut input)
}

/// Runs the console with a custom configuration loader.
#[must_use]
pub(crate) fn run_with_loader<I, R, L>(
    args: I,
    input: &mut R,
    streams: IoStreams,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    L: ConfigLoader,
{
    CliRunner::new(streams, loader, PasswordPrompt::Input).run(args, input)
}
