//! Authenticated connection to the queue server.
//!
//! A [`SessionHandler`] owns the token lifecycle and serialises refreshes
//! behind a single gate, so concurrent callers never trigger two refreshes.
//! Every request flows through [`SessionHandler::send`], which applies the
//! retry policy to transient failures and surfaces everything else at once.

mod retry;

use std::fmt;
use std::io::BufRead;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use magics_config::Config;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

pub use self::retry::RetryPolicy;
use crate::api::{TokenGrant, endpoints};
use crate::error::{AuthError, SessionError, TransportError};
use crate::transport::{ApiRequest, Transport};

pub(crate) const SESSION_TARGET: &str = "magics::session";

/// Login name and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Bundles a login name and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Login name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Lifecycle state of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; requests are refused locally.
    Disconnected,
    /// Login in progress.
    Authenticating,
    /// Requests are flowing.
    Active,
    /// The last request hit a transient failure.
    Degraded,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Degraded => "degraded",
        };
        f.write_str(label)
    }
}

/// Tunables of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    provider: String,
    policy: RetryPolicy,
    refresh_margin: Duration,
}

impl SessionSettings {
    /// Settings for `provider` with the documented defaults.
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            policy: RetryPolicy::default(),
            refresh_margin: Duration::from_secs(magics_config::DEFAULT_REFRESH_MARGIN_SECS),
        }
    }

    /// Settings taken from the resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: config.auth_provider.clone(),
            policy: RetryPolicy::new(config.retry_attempts(), config.retry_backoff()),
            refresh_margin: config.refresh_margin(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the refresh margin.
    #[must_use]
    pub const fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[derive(Debug)]
struct TokenSet {
    access: String,
    refresh: Option<String>,
    expires_at: Option<Instant>,
}

impl TokenSet {
    fn from_grant(grant: TokenGrant) -> Self {
        let expires_at = (grant.expires_in > 0)
            .then(|| Instant::now().checked_add(Duration::from_secs(grant.expires_in)))
            .flatten();
        Self {
            access: grant.access_token,
            refresh: grant.refresh_token,
            expires_at,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    connection: ConnectionState,
    tokens: Option<TokenSet>,
    credentials: Option<Credentials>,
    login_required: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            tokens: None,
            credentials: None,
            login_required: false,
        }
    }
}

/// Owns the authenticated connection to the queue server.
///
/// The handler is acquired once for the lifetime of the console. Dropping it
/// logs out, so the token is revoked on every exit path including unwinding.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use magics_session::{Credentials, ReqwestTransport, SessionHandler, SessionSettings};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let address = "http://127.0.0.1:60610".parse()?;
/// let transport = ReqwestTransport::new(address, Duration::from_secs(5))?;
/// let session = SessionHandler::new(transport, SessionSettings::new("ldap"));
/// session.authenticate(Credentials::new("operator", "secret"))?;
/// # Ok(())
/// # }
/// ```
pub struct SessionHandler<T: Transport> {
    transport: T,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    refresh_gate: Mutex<()>,
}

impl<T: Transport> fmt::Debug for SessionHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandler")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SessionHandler<T> {
    /// Creates a disconnected handler.
    #[must_use]
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        Self {
            transport,
            settings,
            state: Mutex::new(SessionState::default()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock_state().connection
    }

    /// Login name of the authenticated user, if any.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.lock_state()
            .credentials
            .as_ref()
            .map(|credentials| credentials.username().to_owned())
    }

    /// Returns `true` once the server has refused the session's token and
    /// every automatic recovery failed.
    ///
    /// Requests are refused locally until [`SessionHandler::authenticate`]
    /// succeeds again.
    #[must_use]
    pub fn login_required(&self) -> bool {
        self.lock_state().login_required
    }

    /// Logs in and activates the session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when the provider refuses
    /// the login and [`AuthError::Unreachable`] when every attempt failed
    /// transiently. The session is left disconnected in both cases.
    pub fn authenticate(&self, credentials: Credentials) -> Result<(), AuthError> {
        self.set_connection(ConnectionState::Authenticating);
        match self.login(&credentials) {
            Ok(grant) => {
                info!(
                    target: SESSION_TARGET,
                    event = "authenticated",
                    username = %credentials.username(),
                    "session authenticated"
                );
                let mut state = self.lock_state();
                state.tokens = Some(TokenSet::from_grant(grant));
                state.credentials = Some(credentials);
                state.connection = ConnectionState::Active;
                state.login_required = false;
                Ok(())
            }
            Err(error) => {
                warn!(
                    target: SESSION_TARGET,
                    event = "authentication_failed",
                    error = %error,
                    "login failed"
                );
                let mut state = self.lock_state();
                state.tokens = None;
                state.connection = ConnectionState::Disconnected;
                Err(error)
            }
        }
    }

    /// Activates the session without logging in; requests carry no token.
    pub fn connect_anonymous(&self) {
        let mut state = self.lock_state();
        state.tokens = None;
        state.credentials = None;
        state.connection = ConnectionState::Active;
        info!(
            target: SESSION_TARGET,
            event = "anonymous",
            "session active without authentication"
        );
    }

    /// Sends `request` and returns the decoded response.
    ///
    /// The token is refreshed first when it expires within the refresh
    /// margin. Transient failures are retried under the retry policy; every
    /// other failure is returned immediately. A `401` answer drops the token
    /// and disconnects the session until it logs in again.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Disconnected`] without touching the network
    /// when the session is disconnected, [`SessionError::TransientNetwork`]
    /// once the retries are spent, [`SessionError::FatalAuth`] when the token
    /// is refused and [`SessionError::RemoteRejection`] when the server
    /// declines the request.
    pub fn send(&self, request: ApiRequest) -> Result<Value, SessionError> {
        let authorised = self.authorise(request)?;
        let value = self
            .with_retries(true, || self.transport.execute(&authorised))
            .map_err(|error| self.surface(error))?;
        reject_unsuccessful(value)
    }

    /// Opens a line stream for `request`.
    ///
    /// # Errors
    ///
    /// As for [`SessionHandler::send`].
    pub fn open_stream(&self, request: ApiRequest) -> Result<Box<dyn BufRead + Send>, SessionError> {
        let authorised = self.authorise(request)?;
        self.with_retries(true, || self.transport.open_stream(&authorised))
            .map_err(|error| self.surface(error))
    }

    /// Refreshes the token now.
    ///
    /// A rejected refresh falls back to one login with the stored
    /// credentials before the error is surfaced.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when neither the refresh nor the fallback
    /// login succeeds.
    pub fn refresh(&self) -> Result<(), AuthError> {
        let _gate = self
            .refresh_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.refresh_locked()
    }

    /// Logs out and disconnects.
    ///
    /// Logout is attempted once; its failure is logged and ignored. Calling
    /// `close` on a disconnected session does nothing.
    pub fn close(&self) {
        let tokens = {
            let mut state = self.lock_state();
            if state.connection == ConnectionState::Disconnected {
                return;
            }
            state.connection = ConnectionState::Disconnected;
            state.credentials = None;
            state.login_required = false;
            state.tokens.take()
        };
        if let Some(tokens) = tokens {
            let request = ApiRequest::post(endpoints::LOGOUT).with_bearer(Some(tokens.access));
            if let Err(error) = self.transport.execute(&request) {
                debug!(
                    target: SESSION_TARGET,
                    event = "logout_failed",
                    error = %error,
                    "logout failed; token left to expire"
                );
            }
        }
        info!(target: SESSION_TARGET, event = "closed", "session closed");
    }

    fn authorise(&self, request: ApiRequest) -> Result<ApiRequest, SessionError> {
        if self.state() == ConnectionState::Disconnected {
            return Err(SessionError::Disconnected);
        }
        self.ensure_fresh_token()?;
        Ok(request.with_bearer(self.access_token()))
    }

    fn ensure_fresh_token(&self) -> Result<(), SessionError> {
        if !self.needs_refresh() {
            return Ok(());
        }
        let _gate = self
            .refresh_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Another caller may have refreshed while this one waited.
        if !self.needs_refresh() {
            return Ok(());
        }
        self.refresh_locked().map_err(SessionError::from)
    }

    fn needs_refresh(&self) -> bool {
        let state = self.lock_state();
        let Some(expires_at) = state.tokens.as_ref().and_then(|tokens| tokens.expires_at) else {
            return false;
        };
        Instant::now()
            .checked_add(self.settings.refresh_margin)
            .is_none_or(|deadline| expires_at <= deadline)
    }

    fn refresh_locked(&self) -> Result<(), AuthError> {
        let refresh_token = self
            .lock_state()
            .tokens
            .as_ref()
            .and_then(|tokens| tokens.refresh.clone());
        let outcome = refresh_token.map_or_else(
            || {
                Err(AuthError::RefreshRejected {
                    message: String::from("no refresh token was issued"),
                })
            },
            |token| self.request_refresh(token),
        );
        match outcome {
            Ok(grant) => {
                debug!(target: SESSION_TARGET, event = "refreshed", "token refreshed");
                self.store_grant(grant);
                Ok(())
            }
            Err(AuthError::RefreshRejected { message }) => self.reauthenticate(message),
            Err(error) => Err(error),
        }
    }

    fn reauthenticate(&self, reason: String) -> Result<(), AuthError> {
        warn!(
            target: SESSION_TARGET,
            event = "refresh_rejected",
            reason = %reason,
            "refresh rejected; logging in again"
        );
        let credentials = self.lock_state().credentials.clone();
        let Some(credentials) = credentials else {
            self.require_login();
            return Err(AuthError::RefreshRejected { message: reason });
        };
        match self.login(&credentials) {
            Ok(grant) => {
                self.store_grant(grant);
                Ok(())
            }
            Err(error) => {
                self.require_login();
                Err(error)
            }
        }
    }

    fn login(&self, credentials: &Credentials) -> Result<TokenGrant, AuthError> {
        let request = ApiRequest::post_form(
            endpoints::login(&self.settings.provider),
            vec![
                (String::from("username"), credentials.username.clone()),
                (String::from("password"), credentials.password.clone()),
            ],
        );
        let value = self
            .with_retries(false, || self.transport.execute(&request))
            .map_err(|error| match error {
                TransportError::Unauthorized { message, .. }
                | TransportError::Rejected { message, .. } => {
                    AuthError::InvalidCredentials { message }
                }
                TransportError::Transient { message } => AuthError::Unreachable { message },
                other => AuthError::InvalidResponse {
                    message: other.to_string(),
                },
            })?;
        decode_grant(value)
    }

    fn request_refresh(&self, token: String) -> Result<TokenGrant, AuthError> {
        let request = ApiRequest::post_json(endpoints::REFRESH, json!({ "refresh_token": token }));
        let value = self
            .with_retries(false, || self.transport.execute(&request))
            .map_err(|error| match error {
                TransportError::Unauthorized { message, .. }
                | TransportError::Rejected { message, .. } => {
                    AuthError::RefreshRejected { message }
                }
                TransportError::Transient { message } => AuthError::Unreachable { message },
                other => AuthError::InvalidResponse {
                    message: other.to_string(),
                },
            })?;
        decode_grant(value)
    }

    fn with_retries<R>(
        &self,
        track_connection: bool,
        mut attempt: impl FnMut() -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        let policy = self.settings.policy;
        let mut made = 0_u32;
        loop {
            made = made.saturating_add(1);
            match attempt() {
                Ok(value) => {
                    if track_connection {
                        self.recover();
                    }
                    return Ok(value);
                }
                Err(TransportError::Transient { message }) => {
                    if track_connection {
                        self.set_connection(ConnectionState::Degraded);
                    }
                    warn!(
                        target: SESSION_TARGET,
                        event = "transient_failure",
                        attempt = made,
                        attempts = policy.attempts(),
                        error = %message,
                        "transient failure"
                    );
                    if made >= policy.attempts() {
                        return Err(TransportError::Transient { message });
                    }
                    thread::sleep(policy.backoff_for(made));
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn surface(&self, error: TransportError) -> SessionError {
        match error {
            TransportError::Transient { message } => SessionError::TransientNetwork {
                attempts: self.settings.policy.attempts(),
                message,
            },
            TransportError::Unauthorized {
                status: 401,
                message,
            } => {
                warn!(
                    target: SESSION_TARGET,
                    event = "token_refused",
                    error = %message,
                    "server refused the token; login required"
                );
                self.require_login();
                SessionError::FatalAuth { message }
            }
            TransportError::Unauthorized { message, .. } => SessionError::FatalAuth { message },
            TransportError::Rejected { message, .. } => SessionError::RemoteRejection { message },
            other => SessionError::Protocol(other),
        }
    }

    fn recover(&self) {
        let mut state = self.lock_state();
        if state.connection == ConnectionState::Degraded {
            state.connection = ConnectionState::Active;
            info!(target: SESSION_TARGET, event = "recovered", "connection recovered");
        }
    }

    fn store_grant(&self, grant: TokenGrant) {
        let mut state = self.lock_state();
        let previous_refresh = state.tokens.take().and_then(|tokens| tokens.refresh);
        let mut tokens = TokenSet::from_grant(grant);
        if tokens.refresh.is_none() {
            tokens.refresh = previous_refresh;
        }
        state.tokens = Some(tokens);
        if state.connection == ConnectionState::Disconnected {
            state.connection = ConnectionState::Active;
        }
    }

    fn access_token(&self) -> Option<String> {
        self.lock_state()
            .tokens
            .as_ref()
            .map(|tokens| tokens.access.clone())
    }

    fn require_login(&self) {
        let mut state = self.lock_state();
        state.tokens = None;
        state.connection = ConnectionState::Disconnected;
        state.login_required = true;
    }

    fn set_connection(&self, connection: ConnectionState) {
        self.lock_state().connection = connection;
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Drop for SessionHandler<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn decode_grant(value: Value) -> Result<TokenGrant, AuthError> {
    serde_json::from_value(value).map_err(|error| AuthError::InvalidResponse {
        message: error.to_string(),
    })
}

fn reject_unsuccessful(value: Value) -> Result<Value, SessionError> {
    if value.get("success") == Some(&Value::Bool(false)) {
        let message = value
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return Err(SessionError::RemoteRejection { message });
    }
    Ok(value)
}

#[cfg(test)]
mod tests;
