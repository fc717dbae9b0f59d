//! Execution monitor for submitted jobs.
//!
//! A job moves through `queued`, `running` and one terminal state. The
//! [`JobTracker`] enforces that order and delivers the terminal state exactly
//! once, whichever of the status feed or an acknowledged abort gets there
//! first. Feeds only observe; they never decide a job's fate locally.

mod abort;
mod background;
mod feed;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use magics_core::{CorrelationId, JobRequest};
use tracing::{info, warn};

pub use self::abort::{AbortPolicy, abort_job};
pub use self::background::BackgroundMonitor;
pub use self::feed::{CancelToken, PollingFeed, StatusFeed, StreamFeed};
use crate::client::QueueService;
use crate::error::{MonitorError, SessionError};

pub(crate) const MONITOR_TARGET: &str = "magics::monitor";

/// Console text for a job whose status could not be determined.
pub const STATUS_UNKNOWN: &str = "status unknown - reconnect and re-query";

/// Lifecycle state of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Acknowledged by the server and waiting.
    Queued,
    /// Executing.
    Running,
    /// Finished normally.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Aborted, halted or stopped.
    Aborted,
}

impl JobState {
    /// Returns `true` for the final states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }

    /// Maps a server exit status to a terminal state.
    #[must_use]
    pub fn from_exit_status(exit_status: &str) -> Self {
        match exit_status {
            "completed" => Self::Succeeded,
            "aborted" | "halted" | "stopped" => Self::Aborted,
            _ => Self::Failed,
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Succeeded | Self::Failed | Self::Aborted => 2,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Identifies a job acknowledged by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    correlation_id: CorrelationId,
    item_uid: String,
    alias: String,
}

impl JobTicket {
    /// Creates a ticket.
    #[must_use]
    pub fn new(
        correlation_id: CorrelationId,
        item_uid: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            item_uid: item_uid.into(),
            alias: alias.into(),
        }
    }

    /// Client-side correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Server-assigned item uid.
    #[must_use]
    pub fn item_uid(&self) -> &str {
        &self.item_uid
    }

    /// Alias the job was submitted under.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Last known status of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    correlation_id: CorrelationId,
    state: JobState,
    error: Option<String>,
    run_uids: Vec<String>,
}

impl JobStatus {
    fn queued(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            state: JobState::Queued,
            error: None,
            run_uids: Vec::new(),
        }
    }

    /// Correlation id of the job.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> JobState {
        self.state
    }

    /// Server error payload of a failed or aborted job.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Runs produced by a finished job.
    #[must_use]
    pub fn run_uids(&self) -> &[String] {
        &self.run_uids
    }
}

/// What a status feed saw for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Still waiting in the queue.
    Queued,
    /// Executing.
    Running,
    /// Finished with the given server exit status.
    Finished {
        /// Server exit status such as `completed` or `failed`.
        exit_status: String,
        /// Server error message, verbatim.
        message: String,
        /// Runs the job produced.
        run_uids: Vec<String>,
    },
}

impl Observation {
    fn state(&self) -> JobState {
        match self {
            Self::Queued => JobState::Queued,
            Self::Running => JobState::Running,
            Self::Finished { exit_status, .. } => JobState::from_exit_status(exit_status),
        }
    }
}

/// A change reported to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The job moved to a new non-terminal state.
    Changed(JobStatus),
    /// The job reached its terminal state. Delivered once per job.
    Terminal(JobStatus),
    /// The monitor lost track of the job; it may still be running.
    Unknown {
        /// Correlation id of the job.
        correlation_id: CorrelationId,
        /// Why the status is unknown.
        reason: String,
    },
}

/// Receives status updates as they happen.
pub trait StatusReporter: Send + Sync {
    /// Handles one update.
    fn report(&self, update: &StatusUpdate);
}

/// Applies observations to one job's status.
#[derive(Debug)]
pub struct JobTracker {
    status: JobStatus,
}

impl JobTracker {
    /// Starts tracking a freshly queued job.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self {
            status: JobStatus::queued(correlation_id),
        }
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> &JobStatus {
        &self.status
    }

    /// Applies `observation`, returning the update it causes.
    ///
    /// Observations that repeat the current state, move backwards, or arrive
    /// after the terminal state produce nothing.
    pub fn apply(&mut self, observation: Observation) -> Option<StatusUpdate> {
        let next = observation.state();
        if self.status.state.is_terminal() || next.rank() <= self.status.state.rank() {
            return None;
        }
        self.status.state = next;
        if let Observation::Finished {
            message, run_uids, ..
        } = observation
        {
            self.status.error = (!message.is_empty()).then_some(message);
            self.status.run_uids = run_uids;
        }
        let status = self.status.clone();
        Some(if next.is_terminal() {
            StatusUpdate::Terminal(status)
        } else {
            StatusUpdate::Changed(status)
        })
    }

    /// Records an abort acknowledged by the server.
    pub fn mark_aborted(&mut self) -> Option<StatusUpdate> {
        self.apply(Observation::Finished {
            exit_status: String::from("aborted"),
            message: String::new(),
            run_uids: Vec::new(),
        })
    }
}

/// A submitted job shared between the console, its monitor and abort.
#[derive(Clone)]
pub struct ActiveJob {
    ticket: JobTicket,
    tracker: Arc<Mutex<JobTracker>>,
    reporter: Arc<dyn StatusReporter>,
}

impl fmt::Debug for ActiveJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveJob")
            .field("ticket", &self.ticket)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ActiveJob {
    /// Starts tracking `ticket`, reporting the queued state.
    #[must_use]
    pub fn new(ticket: JobTicket, reporter: Arc<dyn StatusReporter>) -> Self {
        let tracker = JobTracker::new(ticket.correlation_id().clone());
        reporter.report(&StatusUpdate::Changed(tracker.status().clone()));
        Self {
            ticket,
            tracker: Arc::new(Mutex::new(tracker)),
            reporter,
        }
    }

    /// Ticket of the job.
    #[must_use]
    pub const fn ticket(&self) -> &JobTicket {
        &self.ticket
    }

    /// Snapshot of the current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.lock().status().clone()
    }

    /// Returns `true` once the terminal state has been delivered.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.lock().status().state().is_terminal()
    }

    /// Applies an observation and reports any resulting change.
    pub fn observe(&self, observation: Observation) {
        let update = self.lock().apply(observation);
        if let Some(change) = update {
            self.reporter.report(&change);
        }
    }

    /// Marks the job aborted after the server acknowledged it.
    pub fn mark_aborted(&self) {
        let update = self.lock().mark_aborted();
        if let Some(change) = update {
            self.reporter.report(&change);
        }
    }

    /// Reports that the job's status could not be determined.
    pub fn report_unknown(&self, error: &MonitorError) {
        warn!(
            target: MONITOR_TARGET,
            event = "status_unknown",
            correlation_id = %self.ticket.correlation_id(),
            item_uid = %self.ticket.item_uid(),
            error = %error,
            "lost track of job"
        );
        self.reporter.report(&StatusUpdate::Unknown {
            correlation_id: self.ticket.correlation_id().clone(),
            reason: error.to_string(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, JobTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How a watch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The job reached its terminal state.
    Finished(JobStatus),
    /// Watching was cancelled before the job finished.
    Detached,
    /// The feed failed; the job may still be running.
    StatusUnknown(MonitorError),
}

/// Submits `request` and starts tracking it.
///
/// The job is queued only once the server acknowledges the submission;
/// a refused submission leaves nothing behind.
///
/// # Errors
///
/// Returns the [`SessionError`] that prevented submission.
pub fn submit<S: QueueService + ?Sized>(
    service: &S,
    request: &JobRequest,
    reporter: Arc<dyn StatusReporter>,
) -> Result<ActiveJob, SessionError> {
    let item_uid = service.submit(&request.plan_item())?;
    info!(
        target: MONITOR_TARGET,
        event = "queued",
        correlation_id = %request.correlation_id(),
        item_uid = %item_uid,
        plan = %request.descriptor().name(),
        "job queued"
    );
    let ticket = JobTicket::new(
        request.correlation_id().clone(),
        item_uid,
        request.descriptor().alias(),
    );
    Ok(ActiveJob::new(ticket, reporter))
}

/// Follows `job` through `feed` until it finishes, the feed fails, or
/// `cancel` fires.
pub fn watch(job: &ActiveJob, feed: &mut dyn StatusFeed, cancel: &CancelToken) -> WatchOutcome {
    loop {
        if job.is_terminal() {
            return WatchOutcome::Finished(job.status());
        }
        match feed.next(job.ticket(), cancel) {
            Ok(Some(observation)) => job.observe(observation),
            Ok(None) => return WatchOutcome::Detached,
            Err(error) => {
                job.report_unknown(&error);
                return WatchOutcome::StatusUnknown(error);
            }
        }
    }
}
