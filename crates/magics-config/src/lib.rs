//! Layered configuration for the magics console.
//!
//! Values are merged from built-in defaults, an optional TOML file,
//! `MAGICS_*` environment variables, and command-line flags, in increasing
//! order of precedence. The retry and polling parameters are deliberately
//! configuration rather than constants so deployments can tune them.

mod address;
mod defaults;
mod logging;
mod mode;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use address::{ServerAddress, ServerAddressError};
pub use defaults::{
    DEFAULT_AUTH_PROVIDER, DEFAULT_DEPLOYMENT, DEFAULT_INTERRUPT_LIMIT, DEFAULT_LOG_FILTER, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REFRESH_MARGIN_SECS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_BACKOFF_MS, DEFAULT_SERVER_URL, default_auth_provider, default_deployment,
    default_log_filter, default_log_filter_string, default_log_format, default_poll_interval,
    default_retry_backoff, default_server_url,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use mode::{AuthMode, OperationMode, StatusSource};

/// Resolved console configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "MAGICS")]
pub struct Config {
    /// Where submitted jobs run.
    #[ortho_config(default = OperationMode::Remote)]
    pub mode: OperationMode,
    /// Base address of the queue server.
    #[ortho_config(default = default_server_url())]
    pub server_url: String,
    /// Authentication provider name used in the login path.
    #[ortho_config(default = default_auth_provider())]
    pub auth_provider: String,
    /// Whether to log in or connect anonymously.
    #[ortho_config(default = AuthMode::Login)]
    pub auth_mode: AuthMode,
    /// Login name; empty means the console prompts for it.
    #[ortho_config(default = String::new())]
    pub username: String,
    /// Name of the job whitelist to load.
    #[ortho_config(default = default_deployment())]
    pub deployment: String,
    /// Attempts made before a transient failure is surfaced.
    #[ortho_config(default = DEFAULT_RETRY_ATTEMPTS)]
    pub retry_attempts: u32,
    /// Delay before the first retry in milliseconds.
    #[ortho_config(default = DEFAULT_RETRY_BACKOFF_MS)]
    pub retry_backoff_ms: u64,
    /// Timeout applied to each HTTP request in milliseconds.
    #[ortho_config(default = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
    /// Interval between status polls in milliseconds.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// Seconds before token expiry at which the session refreshes.
    #[ortho_config(default = DEFAULT_REFRESH_MARGIN_SECS)]
    pub refresh_margin_secs: u64,
    /// Whether job status is polled or streamed.
    #[ortho_config(default = StatusSource::Poll)]
    pub status_source: StatusSource,
    /// Ctrl-C presses absorbed without a new command before the next one
    /// terminates the console.
    #[ortho_config(default = DEFAULT_INTERRUPT_LIMIT)]
    pub interrupt_limit: u32,
    /// Tracing filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Tracing output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: OperationMode::Remote,
            server_url: default_server_url(),
            auth_provider: default_auth_provider(),
            auth_mode: AuthMode::Login,
            username: String::new(),
            deployment: default_deployment(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            status_source: StatusSource::Poll,
            interrupt_limit: DEFAULT_INTERRUPT_LIMIT,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Parses the configured server address.
    pub fn server_address(&self) -> Result<ServerAddress, ServerAddressError> {
        self.server_url.parse()
    }

    /// Returns the configured operation mode.
    #[must_use]
    pub const fn mode(&self) -> OperationMode {
        self.mode
    }

    /// Returns the configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Number of attempts for transient failures, never less than one.
    #[must_use]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.max(1)
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Timeout applied to each request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Interval between status polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Margin before token expiry that triggers a refresh.
    #[must_use]
    pub const fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}
