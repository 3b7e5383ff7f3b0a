//! Interfaces to external collaborators
//!
//! The bootstrap logic only talks to a database server and to a process
//! manager through these traits, so a real ArangoDB server, the in-memory
//! reference server and test doubles are interchangeable.
//!
//! Thread safety: implementations must be `Send + Sync`; every method takes
//! `&self`.

use crate::config::{ConnectionConfig, InstanceSpec};
use crate::deadline::Deadline;
use crate::error::ClientResult;
use crate::types::{AdminUser, BindVars, CollectionKind, InstanceRef};

/// Opens clients from configuration
pub trait Connector: Send + Sync {
    /// Client type produced
    type Client: DatabaseClient;

    /// Build a client.
    ///
    /// Performs no network I/O; failures are configuration errors.
    fn connect(&self, config: &ConnectionConfig) -> ClientResult<Self::Client>;
}

/// Server-level operations
pub trait DatabaseClient: Send + Sync {
    /// Handle type for one logical database
    type Database: Database;

    /// Names of the databases visible to the user; used as the readiness probe
    fn list_databases(&self, deadline: &Deadline) -> ClientResult<Vec<String>>;

    /// Whether a logical database named `name` exists
    fn database_exists(&self, name: &str, deadline: &Deadline) -> ClientResult<bool>;

    /// Create a logical database with `admin` granted access.
    ///
    /// Fails with `ClientError::Conflict` if it already exists.
    fn create_database(
        &self,
        name: &str,
        admin: &AdminUser,
        deadline: &Deadline,
    ) -> ClientResult<Self::Database>;

    /// Open an existing logical database
    fn database(&self, name: &str, deadline: &Deadline) -> ClientResult<Self::Database>;
}

/// Operations on one logical database
pub trait Database: Send + Sync {
    /// Database name
    fn name(&self) -> &str;

    /// Create a collection.
    ///
    /// Succeeds without change if a collection of the same kind exists;
    /// fails with `ClientError::Conflict` if one of the other kind exists.
    fn create_collection(
        &self,
        name: &str,
        kind: CollectionKind,
        deadline: &Deadline,
    ) -> ClientResult<()>;

    /// Execute a script as a single transaction and return its result rows
    fn run_query(
        &self,
        script: &str,
        bind_vars: &BindVars,
        deadline: &Deadline,
    ) -> ClientResult<Vec<serde_json::Value>>;
}

/// Starts and stops isolated database processes
pub trait InstanceManager: Send + Sync {
    /// Start an instance and return once its port is mapped
    fn start_instance(&self, spec: &InstanceSpec) -> ClientResult<InstanceRef>;

    /// Stop an instance; stopping an unknown or stopped instance is an error
    fn stop_instance(&self, instance: &InstanceRef) -> ClientResult<()>;

    /// Everything the instance has logged so far
    fn dump_logs(&self, instance: &InstanceRef) -> String;
}
