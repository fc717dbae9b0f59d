//! Errors raised while registering, resolving, and translating jobs.
//!
//! Every error here is a local validation failure: none of them is produced
//! after a request has left the process, so callers can report them without
//! worrying about partially submitted work.

use thiserror::Error;

/// Errors raised by the shared namespace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    /// No entry exists under the requested name.
    #[error("no namespace entry named '{name}'")]
    NameNotFound {
        /// Name that was looked up.
        name: String,
    },
}

/// Errors raised by a job registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A descriptor with the same alias is already registered.
    #[error("a job is already registered under the alias '{alias}'")]
    DuplicateAlias {
        /// Alias that collided.
        alias: String,
    },
    /// The alias is not permitted in this deployment.
    #[error("'{alias}' is not permitted in the '{deployment}' deployment")]
    UnknownCommand {
        /// Alias that was looked up.
        alias: String,
        /// Deployment whose whitelist was consulted.
        deployment: String,
    },
    /// No whitelist is defined under the requested deployment name.
    #[error("unknown deployment '{name}'")]
    UnknownDeployment {
        /// Deployment name that was requested.
        name: String,
    },
}

/// Errors raised while translating an invocation into a job request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    /// The job cannot take detectors but the input supplied one.
    #[error("'{alias}' does not accept detectors, but '{token}' was given")]
    CapabilityViolation {
        /// Alias being translated.
        alias: String,
        /// Offending token.
        token: String,
    },
    /// A device token has no namespace entry.
    #[error("there is no device named '{token}' available")]
    UnresolvedDevice {
        /// Token that failed to resolve.
        token: String,
    },
    /// A flag is not part of the job's parameter set.
    #[error("'{alias}' does not accept the argument '{flag}'")]
    UnknownArgument {
        /// Alias being translated.
        alias: String,
        /// Unrecognised flag.
        flag: String,
    },
    /// A token could not be converted to the declared type.
    #[error("'{token}' is not valid here: expected {expected}")]
    ArgumentType {
        /// Token that failed to convert.
        token: String,
        /// Description of the expected value.
        expected: String,
    },
    /// A device group received the wrong number of tokens.
    #[error("wrong number of arguments for {group}: {detail}")]
    Arity {
        /// Name of the device group.
        group: String,
        /// Description of the violated constraint.
        detail: String,
    },
    /// A required named parameter was not supplied.
    #[error("missing required argument '{flag}'")]
    MissingArgument {
        /// Preferred flag spelling of the missing parameter.
        flag: String,
    },
}

impl TranslateError {
    /// Builds an [`TranslateError::ArgumentType`] error.
    pub(crate) fn argument_type(token: &str, expected: impl Into<String>) -> Self {
        Self::ArgumentType {
            token: token.to_owned(),
            expected: expected.into(),
        }
    }
}
