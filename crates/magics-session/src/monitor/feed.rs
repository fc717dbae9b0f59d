//! Sources of job observations: periodic polling or the event stream.

use std::io::BufRead;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{JobTicket, MONITOR_TARGET, Observation};
use crate::api::StatusEvent;
use crate::client::QueueService;
use crate::error::MonitorError;

/// Cooperative cancellation shared with a monitor.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    /// A token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token and wakes every waiter.
    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        signal.notify_all();
    }

    /// Returns `true` once the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleeps for up to `timeout`, returning `true` if the token fired.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (cancelled, _) = signal
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }
}

/// Produces observations of one job.
pub trait StatusFeed: Send {
    /// Blocks until the next observation of `ticket`.
    ///
    /// Returns `Ok(None)` when `cancel` fires first.
    ///
    /// # Errors
    ///
    /// Returns a [`MonitorError`] when the job's status cannot be read.
    fn next(
        &mut self,
        ticket: &JobTicket,
        cancel: &CancelToken,
    ) -> Result<Option<Observation>, MonitorError>;
}

/// Polls the status endpoint, reading the history only when it grows.
pub struct PollingFeed {
    service: Arc<dyn QueueService>,
    interval: Duration,
    history_len: Option<u64>,
    started: bool,
}

impl PollingFeed {
    /// Polls `service` every `interval`.
    #[must_use]
    pub fn new(service: Arc<dyn QueueService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            history_len: None,
            started: false,
        }
    }

    fn finished(&self, ticket: &JobTicket) -> Result<Option<Observation>, MonitorError> {
        let history = self.service.history()?;
        Ok(history
            .into_iter()
            .rev()
            .find(|item| item.item_uid == ticket.item_uid())
            .map(|item| {
                let result = item.result.unwrap_or_default();
                Observation::Finished {
                    exit_status: result.exit_status,
                    message: result.msg,
                    run_uids: result.run_uids,
                }
            }))
    }
}

impl StatusFeed for PollingFeed {
    fn next(
        &mut self,
        ticket: &JobTicket,
        cancel: &CancelToken,
    ) -> Result<Option<Observation>, MonitorError> {
        let cancelled = if self.started {
            cancel.wait(self.interval)
        } else {
            self.started = true;
            cancel.is_cancelled()
        };
        if cancelled {
            return Ok(None);
        }

        let status = self.service.status()?;
        if status.running_item_uid.as_deref() == Some(ticket.item_uid()) {
            return Ok(Some(Observation::Running));
        }
        if self.history_len != Some(status.items_in_history) {
            self.history_len = Some(status.items_in_history);
            debug!(
                target: MONITOR_TARGET,
                event = "history_changed",
                items = status.items_in_history,
                item_uid = %ticket.item_uid(),
                "reading history"
            );
            if let Some(finished) = self.finished(ticket)? {
                return Ok(Some(finished));
            }
        }
        Ok(Some(Observation::Queued))
    }
}

/// Consumes the newline-delimited status stream.
///
/// A blocked read is not interrupted by cancellation; the token is checked
/// between events.
pub struct StreamFeed {
    service: Arc<dyn QueueService>,
    reader: Option<Box<dyn BufRead + Send>>,
}

impl StreamFeed {
    /// Streams events from `service`, opening the stream on first use.
    #[must_use]
    pub fn new(service: Arc<dyn QueueService>) -> Self {
        Self {
            service,
            reader: None,
        }
    }
}

impl StatusFeed for StreamFeed {
    fn next(
        &mut self,
        ticket: &JobTicket,
        cancel: &CancelToken,
    ) -> Result<Option<Observation>, MonitorError> {
        let mut line = String::new();
        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            if self.reader.is_none() {
                self.reader = Some(self.service.status_stream()?);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Err(MonitorError::StreamClosed);
            };
            line.clear();
            let read = reader
                .read_line(&mut line)
                .map_err(|error| MonitorError::Stream {
                    message: error.to_string(),
                })?;
            if read == 0 {
                self.reader = None;
                return Err(MonitorError::StreamClosed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event: StatusEvent =
                serde_json::from_str(trimmed).map_err(|error| MonitorError::Stream {
                    message: error.to_string(),
                })?;
            if event.item_uid != ticket.item_uid() {
                continue;
            }
            return Ok(Some(match event.state.as_str() {
                "queued" => Observation::Queued,
                "running" => Observation::Running,
                _ => Observation::Finished {
                    exit_status: event.state,
                    message: event.msg,
                    run_uids: event.run_uids,
                },
            }));
        }
    }
}
