//! Remote abort of a submitted job.
//!
//! A running plan must be paused before the run engine accepts an abort, so
//! the sequence is pause, wait for the pause, then abort. A job still in the
//! queue is removed instead. The local status only changes once the server
//! has acknowledged the final request.

use std::thread;
use std::time::Duration;

use tracing::info;

use super::{ActiveJob, JobStatus, MONITOR_TARGET};
use crate::api::PauseMode;
use crate::client::QueueService;
use crate::error::AbortError;

/// How long to wait for the run engine to pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortPolicy {
    poll_interval: Duration,
    max_polls: u32,
}

impl AbortPolicy {
    /// Polls every `poll_interval`, at most `max_polls` times.
    #[must_use]
    pub const fn new(poll_interval: Duration, max_polls: u32) -> Self {
        Self {
            poll_interval,
            max_polls,
        }
    }
}

impl Default for AbortPolicy {
    fn default() -> Self {
        Self::new(magics_config::default_poll_interval(), 20)
    }
}

/// Aborts `job` on the server.
///
/// # Errors
///
/// Returns [`AbortError::AlreadyFinished`] for a job that already ended,
/// [`AbortError::PauseTimeout`] when the run engine never paused and
/// [`AbortError::Session`] when a control request failed. The job's status
/// is unchanged in every error case.
pub fn abort_job<S: QueueService + ?Sized>(
    service: &S,
    job: &ActiveJob,
    policy: &AbortPolicy,
) -> Result<JobStatus, AbortError> {
    let ticket = job.ticket();
    let already_finished = || AbortError::AlreadyFinished {
        correlation_id: ticket.correlation_id().to_string(),
    };
    if job.is_terminal() {
        return Err(already_finished());
    }

    let status = service.status()?;
    if status.running_item_uid.as_deref() == Some(ticket.item_uid()) {
        if !status.is_paused() {
            service.pause(PauseMode::Immediate)?;
            wait_for_pause(service, ticket.item_uid(), policy).map_err(|error| match error {
                PauseWait::Finished => already_finished(),
                PauseWait::Failed(cause) => cause,
            })?;
        }
        service.abort()?;
    } else {
        service.remove_item(ticket.item_uid())?;
    }

    info!(
        target: MONITOR_TARGET,
        event = "aborted",
        correlation_id = %ticket.correlation_id(),
        item_uid = %ticket.item_uid(),
        "abort acknowledged"
    );
    job.mark_aborted();
    Ok(job.status())
}

enum PauseWait {
    Finished,
    Failed(AbortError),
}

fn wait_for_pause<S: QueueService + ?Sized>(
    service: &S,
    item_uid: &str,
    policy: &AbortPolicy,
) -> Result<(), PauseWait> {
    for _ in 0..policy.max_polls {
        thread::sleep(policy.poll_interval);
        let status = service
            .status()
            .map_err(|error| PauseWait::Failed(error.into()))?;
        if status.running_item_uid.as_deref() != Some(item_uid) {
            return Err(PauseWait::Finished);
        }
        if status.is_paused() {
            return Ok(());
        }
    }
    Err(PauseWait::Failed(AbortError::PauseTimeout))
}
