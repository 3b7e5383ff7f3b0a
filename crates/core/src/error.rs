//! Error types shared across the workspace
//!
//! [`ClientError`] is what every external collaborator (database client,
//! instance manager) reports. Higher layers wrap it with context instead of
//! inspecting its text.

use crate::deadline::Interrupt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Errors reported by database clients and instance managers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Connection could not be set up (bad endpoint, bad credentials format)
    #[error("connection error: {0}")]
    Connection(String),

    /// Request never produced a response (refused, reset, DNS, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with an error status
    #[error("server error {status} (code {code}): {message}")]
    Http {
        /// HTTP status
        status: u16,
        /// Server-specific error number, 0 when absent
        code: u32,
        /// Server error message
        message: String,
    },

    /// Credentials were rejected
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Named entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Entity exists with an incompatible shape
    #[error("conflict: {0}")]
    Conflict(String),

    /// Query was rejected or failed while executing
    #[error("query failed: {0}")]
    Query(String),

    /// Deadline fired or the caller cancelled
    #[error("{0}")]
    Interrupted(Interrupt),

    /// Instance process management failed
    #[error("instance error: {0}")]
    Instance(String),
}

impl ClientError {
    /// Returns the interrupt if this error is a deadline or cancellation
    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            ClientError::Interrupted(interrupt) => Some(*interrupt),
            _ => None,
        }
    }
}

impl From<Interrupt> for ClientError {
    fn from(interrupt: Interrupt) -> Self {
        ClientError::Interrupted(interrupt)
    }
}

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Config text is not valid TOML for the target type
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value for '{field}': {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}
