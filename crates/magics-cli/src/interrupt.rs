//! Ctrl-C handling.
//!
//! SIGINT is consumed on a watcher thread instead of terminating the
//! process. The watcher consults the [`Foreground`] shared with the console:
//! a soft wait is simply released, an active job is aborted through the
//! queue server, and otherwise the operator gets a hint. The session and
//! namespace are only reached through ordinary requests.
//!
//! Interrupts are counted from the last submitted job or wait. Once the
//! count passes the configured limit the watcher stops and SIGINT gets its
//! default behaviour, so a wedged console can still be terminated.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use magics_session::{AbortError, AbortPolicy, ActiveJob, CancelToken, QueueService, abort_job};
use signal_hook::consts::signal::SIGINT;
use signal_hook::iterator::{Handle, Signals};
use signal_hook::low_level::emulate_default_handler;
use tracing::{info, warn};

use crate::CLI_TARGET;
use crate::errors::AppError;
use crate::output::IoStreams;

const IDLE_HINT: &str = "Nothing is running. Type 'exit' to leave the console.";

/// What the console is doing in the foreground.
#[derive(Clone, Default)]
pub(crate) struct Foreground {
    inner: Arc<Mutex<ForegroundState>>,
}

#[derive(Default)]
struct ForegroundState {
    job: Option<ActiveJob>,
    wait: Option<Wait>,
    interrupts: u32,
}

struct Wait {
    soft: bool,
    cancel: CancelToken,
}

impl Foreground {
    /// Makes `job` the target of `abort` and Ctrl-C.
    pub(crate) fn set_job(&self, job: ActiveJob) {
        let mut state = self.lock();
        state.job = Some(job);
        state.interrupts = 0;
    }

    /// The most recently submitted job.
    pub(crate) fn job(&self) -> Option<ActiveJob> {
        self.lock().job.clone()
    }

    /// The most recent job while it has not finished.
    pub(crate) fn active_job(&self) -> Option<ActiveJob> {
        self.job().filter(|job| !job.is_terminal())
    }

    /// Enters a wait that Ctrl-C can end; the returned token fires then.
    pub(crate) fn begin_wait(&self, soft: bool) -> CancelToken {
        let cancel = CancelToken::new();
        let mut state = self.lock();
        state.wait = Some(Wait {
            soft,
            cancel: cancel.clone(),
        });
        state.interrupts = 0;
        cancel
    }

    pub(crate) fn end_wait(&self) {
        self.lock().wait = None;
    }

    fn lock(&self) -> MutexGuard<'_, ForegroundState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the watcher does after an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// The interrupt was absorbed.
    Handled,
    /// Too many interrupts; SIGINT should terminate the process.
    Release,
}

/// Acts on one interrupt.
#[derive(Clone)]
pub(crate) struct InterruptHandler {
    foreground: Foreground,
    service: Option<Arc<dyn QueueService>>,
    policy: AbortPolicy,
    limit: u32,
    streams: IoStreams,
}

impl InterruptHandler {
    pub(crate) fn new(
        foreground: Foreground,
        service: Option<Arc<dyn QueueService>>,
        policy: AbortPolicy,
        limit: u32,
        streams: IoStreams,
    ) -> Self {
        Self {
            foreground,
            service,
            policy,
            limit,
            streams,
        }
    }

    /// Counts the interrupt and acts on it while under the limit.
    pub(crate) fn handle(&self) -> Disposition {
        let count = {
            let mut state = self.foreground.lock();
            state.interrupts = state.interrupts.saturating_add(1);
            state.interrupts
        };
        if count > self.limit {
            warn!(
                target: CLI_TARGET,
                event = "interrupt_limit",
                count,
                limit = self.limit,
                "interrupt limit exceeded; restoring the default handler"
            );
            return Disposition::Release;
        }
        self.act();
        Disposition::Handled
    }

    fn act(&self) {
        let (job, wait) = {
            let state = self.foreground.lock();
            let wait = state
                .wait
                .as_ref()
                .map(|wait| (wait.soft, wait.cancel.clone()));
            (state.job.clone(), wait)
        };

        if let Some((true, cancel)) = &wait {
            cancel.cancel();
            self.streams
                .stdout
                .line("Leaving wait mode without sending any commands.");
            return;
        }

        let active = job.filter(|job| !job.is_terminal());
        match (active, self.service.as_deref()) {
            (Some(job), Some(service)) => self.abort(service, &job),
            _ => {
                if let Some((_, cancel)) = wait {
                    cancel.cancel();
                }
                self.streams.stdout.line(IDLE_HINT);
            }
        }
    }

    fn abort(&self, service: &dyn QueueService, job: &ActiveJob) {
        let correlation_id = job.ticket().correlation_id();
        self.streams
            .stdout
            .line(format!("[{correlation_id}] abort requested"));
        match abort_job(service, job, &self.policy) {
            Ok(_) => {}
            Err(AbortError::AlreadyFinished { .. }) => {
                self.streams
                    .stdout
                    .line(format!("[{correlation_id}] already finished"));
            }
            Err(error) => {
                warn!(
                    target: CLI_TARGET,
                    event = "abort_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "abort failed"
                );
                self.streams
                    .stderr
                    .line(format!("Failed to abort plan execution: {error}"));
            }
        }
    }
}

/// Thread turning SIGINT into [`InterruptHandler::handle`] calls.
///
/// Dropping the watcher unregisters the signal and joins the thread.
pub(crate) struct InterruptWatcher {
    signals: Handle,
    thread: Option<JoinHandle<()>>,
}

impl InterruptWatcher {
    pub(crate) fn install(handler: InterruptHandler) -> Result<Self, AppError> {
        let mut signals = Signals::new([SIGINT]).map_err(AppError::Interrupt)?;
        let handle = signals.handle();
        let release = handle.clone();
        let thread = thread::Builder::new()
            .name(String::from("interrupt-watcher"))
            .spawn(move || {
                for signal in signals.forever() {
                    info!(target: CLI_TARGET, event = "interrupt", signal, "interrupt received");
                    if handler.handle() == Disposition::Release {
                        release.close();
                        if let Err(error) = emulate_default_handler(SIGINT) {
                            warn!(
                                target: CLI_TARGET,
                                event = "default_handler_failed",
                                error = %error,
                                "default SIGINT handler could not run"
                            );
                        }
                        break;
                    }
                }
            })
            .map_err(AppError::Interrupt)?;
        Ok(Self {
            signals: handle,
            thread: Some(thread),
        })
    }
}

impl Drop for InterruptWatcher {
    fn drop(&mut self) {
        self.signals.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(target: CLI_TARGET, event = "watcher_panicked", "interrupt watcher panicked");
            }
        }
    }
}
