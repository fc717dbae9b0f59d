//! Error taxonomy of the session and monitoring layers.
//!
//! [`TransportError`] classifies a single HTTP exchange. The session turns it
//! into a [`SessionError`] after applying the retry policy, so callers only
//! see transient failures once every attempt has been spent.

use thiserror::Error;

/// Failure of a single request at the transport level.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Refused connection, a timeout on a request that may be replayed, or
    /// an overloaded server.
    #[error("transient network failure: {message}")]
    Transient {
        /// Human-readable description.
        message: String,
    },
    /// The server refused the credentials or token.
    #[error("unauthorised ({status}): {message}")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
        /// Server-provided detail.
        message: String,
    },
    /// The server rejected the request.
    #[error("rejected ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Server-provided detail.
        message: String,
    },
    /// The request left the client but no answer arrived, so it may have
    /// taken effect on the server.
    #[error("no answer after the request was sent: {message}")]
    Unconfirmed {
        /// Description of the failure.
        message: String,
    },
    /// The request could not be built or was redirected.
    #[error("request could not be sent: {message}")]
    Client {
        /// Description of the failure.
        message: String,
    },
    /// The response body could not be decoded.
    #[error("malformed response: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },
    /// The endpoint URL could not be built.
    #[error("invalid endpoint '{path}': {message}")]
    Endpoint {
        /// Path that failed to join.
        path: String,
        /// Description of the failure.
        message: String,
    },
}

/// Authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The provider rejected the credentials.
    #[error("login rejected: {message}")]
    InvalidCredentials {
        /// Server-provided detail.
        message: String,
    },
    /// The server could not be reached.
    #[error("could not reach the queue server: {message}")]
    Unreachable {
        /// Description of the last failure.
        message: String,
    },
    /// The refresh token was rejected and no credentials were stored.
    #[error("session refresh rejected: {message}")]
    RefreshRejected {
        /// Server-provided detail.
        message: String,
    },
    /// The server answered login with an unexpected payload.
    #[error("unexpected login response: {message}")]
    InvalidResponse {
        /// Description of the problem.
        message: String,
    },
}

/// Failures surfaced by [`crate::SessionHandler::send`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session is disconnected; nothing was sent.
    #[error("not connected to the queue server")]
    Disconnected,
    /// Every attempt failed with a transient error.
    #[error("queue server unavailable after {attempts} attempt(s): {message}")]
    TransientNetwork {
        /// Attempts made.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },
    /// The server refused the session's token.
    #[error("authentication failed: {message}")]
    FatalAuth {
        /// Server-provided detail.
        message: String,
    },
    /// The server refused the request on business grounds.
    #[error("{message}")]
    RemoteRejection {
        /// Server-provided reason, verbatim.
        message: String,
    },
    /// Re-authentication after a rejected refresh failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The request could not be built or the response decoded.
    #[error(transparent)]
    Protocol(TransportError),
}

impl SessionError {
    /// Returns `true` when the failure means the server could not be reached.
    #[must_use]
    pub const fn is_connectivity(&self) -> bool {
        matches!(self, Self::Disconnected | Self::TransientNetwork { .. })
    }
}

/// Failures while following a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// A status request failed.
    #[error("status query failed: {0}")]
    Status(#[from] SessionError),
    /// The status stream ended before the job finished.
    #[error("status stream closed")]
    StreamClosed,
    /// Reading the status stream failed.
    #[error("status stream failed: {message}")]
    Stream {
        /// Description of the failure.
        message: String,
    },
    /// The monitor thread could not be started.
    #[error("failed to start the monitor thread: {message}")]
    Spawn {
        /// Description of the failure.
        message: String,
    },
    /// The monitor thread panicked.
    #[error("monitor thread panicked")]
    Panicked,
}

/// Failures while aborting a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbortError {
    /// The job already reached a terminal state.
    #[error("job {correlation_id} has already finished")]
    AlreadyFinished {
        /// Correlation id of the job.
        correlation_id: String,
    },
    /// The run engine did not report a pause in time.
    #[error("the run engine did not pause; abort was not sent")]
    PauseTimeout,
    /// A control request failed; the job state is unchanged.
    #[error(transparent)]
    Session(#[from] SessionError),
}
