//! Error types for the EC2 CLI binding.

use thiserror::Error;

use crate::command::CommandError;

/// Errors raised by the EC2 binding.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Ec2Error {
    /// Raised when a provider call is rejected or its wait cannot reach the
    /// expected state.
    #[error("{operation} failed for {resource_id}: {message}")]
    OperationFailed {
        /// Provider operation that failed (for example `detach-volume`).
        operation: String,
        /// Identifier of the resource being operated on.
        resource_id: String,
        /// Message reported by the provider CLI.
        message: String,
    },
    /// Raised when a wait does not observe the expected state in time.
    #[error("timeout waiting for {operation} on {resource_id}")]
    Timeout {
        /// Operation being waited on.
        operation: String,
        /// Identifier of the resource being waited on.
        resource_id: String,
    },
    /// Raised when a described resource does not exist.
    #[error("resource {resource_id} not found")]
    NotFound {
        /// Identifier that could not be resolved.
        resource_id: String,
    },
    /// Raised when CLI JSON output cannot be interpreted.
    #[error("failed to parse {operation} output: {message}")]
    Parse {
        /// Operation whose output failed to parse.
        operation: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when the provider CLI cannot be executed at all.
    #[error(transparent)]
    Runner(#[from] CommandError),
}
