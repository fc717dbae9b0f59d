//! Enumerations selecting how the console talks to the outside world.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Where submitted jobs are executed.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OperationMode {
    /// Jobs are sent to the remote queue server.
    #[default]
    Remote,
    /// Jobs run in the in-process engine.
    Local,
    /// Jobs are translated and recorded in the namespace without running.
    Test,
}

impl OperationMode {
    /// Returns `true` when commands need a remote session.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::Remote)
    }
}

/// How the session authenticates against the queue server.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AuthMode {
    /// Log in with a username and password through the configured provider.
    #[default]
    Login,
    /// Skip login; the server must allow unauthenticated access.
    Anonymous,
}

/// How the execution monitor learns about job progress.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StatusSource {
    /// Poll the status and history endpoints at a fixed interval.
    #[default]
    Poll,
    /// Consume the server's newline-delimited status stream.
    Stream,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("remote", OperationMode::Remote)]
    #[case("Local", OperationMode::Local)]
    #[case("test", OperationMode::Test)]
    fn parses_operation_modes(#[case] input: &str, #[case] expected: OperationMode) {
        let parsed: OperationMode = input.parse().expect("mode should parse");
        assert_eq!(parsed, expected);
    }

    #[test]
    fn rejects_unknown_status_source() {
        assert!("websocket".parse::<StatusSource>().is_err());
    }

    #[test]
    fn only_remote_mode_needs_a_session() {
        assert!(OperationMode::Remote.is_remote());
        assert!(!OperationMode::Local.is_remote());
        assert!(!OperationMode::Test.is_remote());
    }
}
