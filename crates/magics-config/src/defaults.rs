use std::time::Duration;

use crate::logging::LogFormat;

/// Default address of the queue server's HTTP interface.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:60610/";

/// Authentication provider used when none is configured.
pub const DEFAULT_AUTH_PROVIDER: &str = "ldap";

/// Whitelist used when no deployment is named.
pub const DEFAULT_DEPLOYMENT: &str = "common";

/// Number of attempts made for a request failing with transient errors.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubled for each later attempt.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;

/// Per-request timeout applied by the HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Interval between status polls while monitoring a job.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Seconds before token expiry at which a refresh is triggered.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 1;

/// Interrupts absorbed by the console before Ctrl-C terminates it.
pub const DEFAULT_INTERRUPT_LIMIT: u32 = 10;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binary.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binary.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Owned default queue server address.
#[must_use]
pub fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_owned()
}

/// Owned default authentication provider.
#[must_use]
pub fn default_auth_provider() -> String {
    DEFAULT_AUTH_PROVIDER.to_owned()
}

/// Owned default deployment name.
#[must_use]
pub fn default_deployment() -> String {
    DEFAULT_DEPLOYMENT.to_owned()
}

/// Default delay before the first retry.
#[must_use]
pub const fn default_retry_backoff() -> Duration {
    Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)
}

/// Default status poll interval.
#[must_use]
pub const fn default_poll_interval() -> Duration {
    Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
}
