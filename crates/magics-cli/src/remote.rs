//! Connection to the queue server for remote mode.

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use magics_config::{AuthMode, Config, StatusSource};
use magics_session::{
    AbortPolicy, ActiveJob, AuthError, BackgroundMonitor, Credentials, MonitorError, PollingFeed, QueueClient,
    QueueService, ReqwestTransport, SessionHandler, SessionSettings, StatusFeed, StreamFeed,
    WatchOutcome,
};
use tracing::info;

use crate::CLI_TARGET;
use crate::errors::AppError;
use crate::output::IoStreams;

/// Environment variable read before prompting for a password.
pub(crate) const PASSWORD_ENV: &str = "MAGICS_PASSWORD";

/// Polls made while waiting for the run engine to pause during an abort.
const ABORT_POLLS: u32 = 20;

/// Refused passwords tolerated when logging in again mid-session.
const RELOGIN_ATTEMPTS: u32 = 3;

/// Where the password is read when the environment does not supply it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasswordPrompt {
    /// Read from the terminal with echo switched off.
    Hidden,
    /// Read from the console input like any other answer.
    #[default]
    Input,
}

/// Session, typed client and the monitors following submitted jobs.
pub(crate) struct RemoteBackend {
    session: Arc<SessionHandler<ReqwestTransport>>,
    service: Arc<dyn QueueService>,
    status_source: StatusSource,
    poll_interval: Duration,
    monitors: Vec<BackgroundMonitor>,
    username: String,
    password_prompt: PasswordPrompt,
}

impl RemoteBackend {
    /// Opens a session as configured, prompting on `input` for missing
    /// credentials.
    pub(crate) fn connect<R: BufRead>(
        config: &Config,
        input: &mut R,
        streams: &IoStreams,
        password_prompt: PasswordPrompt,
    ) -> Result<Self, AppError> {
        let address = config.server_address()?;
        let transport = ReqwestTransport::new(address.clone(), config.request_timeout())
            .map_err(AppError::Transport)?;
        let session = Arc::new(SessionHandler::new(
            transport,
            SessionSettings::from_config(config),
        ));

        match config.auth_mode {
            AuthMode::Login => session.authenticate(credentials(
                &config.username,
                password_prompt,
                input,
                streams,
            )?)?,
            AuthMode::Anonymous => session.connect_anonymous(),
        }
        info!(
            target: CLI_TARGET,
            event = "connected",
            server = %address,
            auth_mode = %config.auth_mode,
            "connected to the queue server"
        );

        let service: Arc<dyn QueueService> = Arc::new(QueueClient::new(Arc::clone(&session)));
        Ok(Self {
            session,
            service,
            status_source: config.status_source,
            poll_interval: config.poll_interval(),
            monitors: Vec::new(),
            username: config.username.clone(),
            password_prompt,
        })
    }

    /// Returns `true` once the server has refused the session's token.
    pub(crate) fn needs_login(&self) -> bool {
        self.session.login_required()
    }

    /// Logs in again after the server refused the session's token.
    ///
    /// The user is asked for the password again; a refused password may be
    /// retyped up to [`RELOGIN_ATTEMPTS`] times in total.
    pub(crate) fn relogin<R: BufRead>(
        &self,
        input: &mut R,
        streams: &IoStreams,
    ) -> Result<(), AppError> {
        streams
            .stderr
            .line("The server no longer accepts this session; please log in again.");
        let username = self
            .session
            .username()
            .unwrap_or_else(|| self.username.clone());
        let mut attempt = 1_u32;
        loop {
            let details = credentials(&username, self.password_prompt, input, streams)?;
            match self.session.authenticate(details) {
                Ok(()) => {
                    info!(
                        target: CLI_TARGET,
                        event = "relogged_in",
                        attempt,
                        "logged in again"
                    );
                    return Ok(());
                }
                Err(AuthError::InvalidCredentials { message }) if attempt < RELOGIN_ATTEMPTS => {
                    streams.stderr.line(format!("Login refused: {message}"));
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(AppError::Login(error)),
            }
        }
    }

    pub(crate) const fn service(&self) -> &Arc<dyn QueueService> {
        &self.service
    }

    pub(crate) const fn abort_policy(&self) -> AbortPolicy {
        AbortPolicy::new(self.poll_interval, ABORT_POLLS)
    }

    /// Starts a background monitor for `job`.
    pub(crate) fn follow(&mut self, job: &ActiveJob) -> Result<(), MonitorError> {
        self.monitors.retain(|monitor| !monitor.is_finished());
        let feed: Box<dyn StatusFeed> = match self.status_source {
            StatusSource::Poll => Box::new(PollingFeed::new(
                Arc::clone(&self.service),
                self.poll_interval,
            )),
            StatusSource::Stream => Box::new(StreamFeed::new(Arc::clone(&self.service))),
        };
        self.monitors.push(BackgroundMonitor::spawn(job.clone(), feed)?);
        Ok(())
    }

    /// Returns `true` while a monitor is still following `job`.
    pub(crate) fn is_following(&self, job: &ActiveJob) -> bool {
        self.monitors
            .iter()
            .any(|monitor| monitor.job().ticket() == job.ticket() && !monitor.is_finished())
    }

    /// Returns `true` while any monitor is still running.
    pub(crate) fn has_running_monitors(&self) -> bool {
        self.monitors.iter().any(|monitor| !monitor.is_finished())
    }

    /// Blocks until the monitor following `job` ends.
    pub(crate) fn join(&mut self, job: &ActiveJob) -> Result<WatchOutcome, MonitorError> {
        let position = self
            .monitors
            .iter()
            .position(|monitor| monitor.job().ticket() == job.ticket());
        match position {
            Some(index) => self.monitors.swap_remove(index).join(),
            None => Ok(WatchOutcome::Detached),
        }
    }

    /// Cancels the monitors and logs out.
    pub(crate) fn close(&mut self) {
        for monitor in self.monitors.drain(..) {
            monitor.cancel();
        }
        self.session.close();
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        self.close();
    }
}

fn credentials<R: BufRead>(
    username: &str,
    prompt: PasswordPrompt,
    input: &mut R,
    streams: &IoStreams,
) -> Result<Credentials, AppError> {
    let username = if username.is_empty() {
        read_answer(input, streams, "Username: ", "username")?
    } else {
        username.to_owned()
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => password,
        _ => read_password(prompt, input, streams)?,
    };
    Ok(Credentials::new(username, password))
}

fn read_password<R: BufRead>(
    prompt: PasswordPrompt,
    input: &mut R,
    streams: &IoStreams,
) -> Result<String, AppError> {
    match prompt {
        PasswordPrompt::Input => read_answer(input, streams, "Password: ", "password"),
        PasswordPrompt::Hidden => {
            let password = rpassword::prompt_password("Password: ").map_err(|source| {
                AppError::ReadInput {
                    what: "password",
                    source,
                }
            })?;
            if password.is_empty() {
                return Err(AppError::MissingInput { what: "password" });
            }
            Ok(password)
        }
    }
}

fn read_answer<R: BufRead>(
    input: &mut R,
    streams: &IoStreams,
    prompt: &str,
    what: &'static str,
) -> Result<String, AppError> {
    streams.stdout.prompt(prompt);
    let mut answer = String::new();
    input
        .read_line(&mut answer)
        .map_err(|source| AppError::ReadInput { what, source })?;
    let trimmed = answer.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Err(AppError::MissingInput { what });
    }
    Ok(trimmed.to_owned())
}
