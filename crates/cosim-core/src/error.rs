//! Error types for cosim-core
//!
//! The same taxonomy is used by the Core contract and by the federate
//! runtime built on top of it, so a Core failure can be propagated to the
//! application without translation.

use thiserror::Error;

/// Co-simulation error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operation attempted in the wrong lifecycle state
    #[error("Invalid function call: {0}")]
    InvalidFunctionCall(String),

    /// Malformed argument (negative time delta, wrong payload size, ...)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The Core rejected the creation of an interface or federate
    #[error("Registration failure: {0}")]
    RegistrationFailure(String),

    /// Out-of-range publication/input/endpoint/connector id on a data-path call
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The Core failed while executing a time request
    #[error("Execution failure: {0}")]
    ExecutionFailure(String),

    /// Error raised by a federate through the error reporting path
    #[error("Federate error {code}: {message}")]
    Federate { code: i32, message: String },

    /// The federate is no longer attached to a Core
    #[error("Federate is disconnected from its core")]
    Disconnected,

    /// A background task ended without producing a result
    #[error("Async task lost: {0}")]
    AsyncTaskLost(String),
}

impl Error {
    /// Whether this error leaves the federate unusable
    ///
    /// Execution failures and federate-reported errors force the federate
    /// into its error state; everything else is a local validation failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ExecutionFailure(_) | Error::Federate { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
