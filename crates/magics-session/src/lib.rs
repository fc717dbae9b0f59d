//! Remote session and execution monitoring for the magics console.
//!
//! The layers stack from the wire upwards:
//!
//! - [`Transport`] executes single HTTP exchanges and classifies failures.
//! - [`SessionHandler`] owns login, token refresh, retries and logout.
//! - [`QueueClient`] exposes the queue server's operations as typed calls
//!   behind the [`QueueService`] trait.
//! - [`monitor`] submits jobs and follows them to a terminal state, in the
//!   foreground or on a [`BackgroundMonitor`] thread.

pub mod api;
pub mod client;
pub mod error;
pub mod monitor;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

pub use self::api::{
    EnvironmentAction, HistoryItem, PauseMode, RunResult, StatusSnapshot, endpoints,
};
pub use self::client::{QueueClient, QueueService};
pub use self::error::{AbortError, AuthError, MonitorError, SessionError, TransportError};
pub use self::monitor::{
    AbortPolicy, ActiveJob, BackgroundMonitor, CancelToken, JobState, JobStatus, JobTicket,
    PollingFeed, STATUS_UNKNOWN, StatusFeed, StatusReporter, StatusUpdate, StreamFeed,
    WatchOutcome, abort_job, submit, watch,
};
pub use self::session::{
    ConnectionState, Credentials, RetryPolicy, SessionHandler, SessionSettings,
};
pub use self::transport::{ApiRequest, ReqwestTransport, Transport};
