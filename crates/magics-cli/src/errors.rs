//! Error types for the CLI runtime.
//!
//! Every [`AppError`] stops the console before or while it starts, so all of
//! them share the startup exit code. Failed commands are reported by the
//! console itself and never become an `AppError`.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use magics_config::ServerAddressError;
use magics_core::RegistryError;
use magics_session::{AuthError, TransportError};
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Exit code for configuration and startup failures.
pub(crate) const STARTUP_FAILURE: u8 = 2;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("invalid server url: {0}")]
    ServerAddress(#[from] ServerAddressError),
    #[error("failed to prepare the HTTP client: {0}")]
    Transport(#[source] TransportError),
    #[error("failed to load the '{deployment}' whitelist: {source}")]
    Deployment {
        deployment: String,
        #[source]
        source: RegistryError,
    },
    #[error("failed to log in: {0}")]
    Login(#[from] AuthError),
    #[error("failed to read the {what}: {source}")]
    ReadInput {
        what: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("no {what} was provided")]
    MissingInput { what: &'static str },
    #[error("failed to install the interrupt handler: {0}")]
    Interrupt(#[source] io::Error),
}

impl AppError {
    pub(crate) fn exit_code(&self) -> ExitCode {
        ExitCode::from(STARTUP_FAILURE)
    }
}
