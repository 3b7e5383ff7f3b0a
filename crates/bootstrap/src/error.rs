//! Bootstrap error taxonomy

use seedbed_core::{ClientError, CollectionKind, Interrupt};
use std::fmt;
use thiserror::Error;

/// Result type alias for bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Step of the provisioning sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the client
    Connect,
    /// Waiting for the server to answer
    AwaitReady,
    /// Checking, creating or opening the logical database
    Database,
    /// Creating collections
    Migrate,
    /// Running the seed script
    Seed,
}

impl Phase {
    /// Lowercase name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Connect => "connect",
            Phase::AwaitReady => "await-ready",
            Phase::Database => "database",
            Phase::Migrate => "migrate",
            Phase::Seed => "seed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from readiness polling, migration, seeding and provisioning
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Client could not be built
    #[error("failed to connect to {endpoint}: {cause}")]
    Connection {
        /// Endpoint the client was built for
        endpoint: String,
        /// Underlying error
        #[source]
        cause: ClientError,
    },

    /// Server never answered before the deadline
    #[error("{endpoint} unreachable after {attempts} attempt(s): {last_error}")]
    Unreachable {
        /// Endpoint polled
        endpoint: String,
        /// Probes issued
        attempts: u32,
        /// Last probe failure, or a note that no probe ran
        last_error: String,
    },

    /// The caller cancelled the operation
    #[error("{operation} cancelled")]
    Cancelled {
        /// What was running
        operation: &'static str,
    },

    /// Logical database could not be checked, created or opened
    #[error("database {name}: {cause}")]
    Database {
        /// Database name
        name: String,
        /// Underlying error
        #[source]
        cause: ClientError,
    },

    /// A collection could not be created
    #[error("failed to create {kind} collection {collection}: {cause}")]
    Schema {
        /// Collection name
        collection: String,
        /// Requested kind
        kind: CollectionKind,
        /// Underlying error
        #[source]
        cause: ClientError,
    },

    /// The seed script failed and none of it was applied
    #[error("seed script failed: {cause}")]
    Seed {
        /// Script text
        script: String,
        /// Underlying error
        #[source]
        cause: ClientError,
    },

    /// A provisioning step failed
    #[error("provisioning database {database} failed during {phase}: {source}")]
    Provisioning {
        /// Database being provisioned
        database: String,
        /// Step that failed
        phase: Phase,
        /// Step error
        #[source]
        source: Box<BootstrapError>,
    },
}

impl BootstrapError {
    /// Wrap a step failure with provisioning context
    pub fn provisioning(database: &str, phase: Phase, source: BootstrapError) -> Self {
        BootstrapError::Provisioning {
            database: database.to_string(),
            phase,
            source: Box::new(source),
        }
    }

    /// Phase of a provisioning failure
    pub fn phase(&self) -> Option<Phase> {
        match self {
            BootstrapError::Provisioning { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Innermost error, looking through provisioning context
    pub fn root(&self) -> &BootstrapError {
        match self {
            BootstrapError::Provisioning { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether the failure came from cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), BootstrapError::Cancelled { .. })
    }

    /// Whether the failure came from a deadline firing
    pub fn is_timeout(&self) -> bool {
        match self.root() {
            BootstrapError::Unreachable { .. } => true,
            BootstrapError::Database { cause, .. }
            | BootstrapError::Schema { cause, .. }
            | BootstrapError::Seed { cause, .. }
            | BootstrapError::Connection { cause, .. } => {
                cause.interrupt() == Some(Interrupt::Expired)
            }
            _ => false,
        }
    }
}

/// Turn a client error into `Cancelled` when the caller cancelled, else wrap it
pub(crate) fn classify(
    cause: ClientError,
    operation: &'static str,
    wrap: impl FnOnce(ClientError) -> BootstrapError,
) -> BootstrapError {
    if cause.interrupt() == Some(Interrupt::Cancelled) {
        BootstrapError::Cancelled { operation }
    } else {
        wrap(cause)
    }
}
