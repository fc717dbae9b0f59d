//! Monitoring on a background thread so the prompt stays responsive.

use std::thread::{self, JoinHandle};

use tracing::debug;

use super::{ActiveJob, CancelToken, MONITOR_TARGET, StatusFeed, WatchOutcome, watch};
use crate::error::MonitorError;

/// A job followed by a dedicated thread.
///
/// Dropping the monitor cancels it without waiting for the thread.
#[derive(Debug)]
pub struct BackgroundMonitor {
    job: ActiveJob,
    cancel: CancelToken,
    handle: Option<JoinHandle<WatchOutcome>>,
}

impl BackgroundMonitor {
    /// Starts following `job` through `feed`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Spawn`] when the thread cannot be created.
    pub fn spawn(job: ActiveJob, mut feed: Box<dyn StatusFeed>) -> Result<Self, MonitorError> {
        let cancel = CancelToken::new();
        let worker_job = job.clone();
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name(format!("monitor-{}", job.ticket().correlation_id()))
            .spawn(move || watch(&worker_job, feed.as_mut(), &worker_cancel))
            .map_err(|error| MonitorError::Spawn {
                message: error.to_string(),
            })?;
        debug!(
            target: MONITOR_TARGET,
            event = "monitor_started",
            correlation_id = %job.ticket().correlation_id(),
            "background monitor started"
        );
        Ok(Self {
            job,
            cancel,
            handle: Some(handle),
        })
    }

    /// The job being followed.
    #[must_use]
    pub const fn job(&self) -> &ActiveJob {
        &self.job
    }

    /// Asks the thread to stop at its next opportunity.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the thread and returns how the watch ended.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Panicked`] if the thread panicked.
    pub fn join(mut self) -> Result<WatchOutcome, MonitorError> {
        let Some(handle) = self.handle.take() else {
            return Ok(WatchOutcome::Detached);
        };
        handle.join().map_err(|_| MonitorError::Panicked)
    }
}

impl Drop for BackgroundMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
