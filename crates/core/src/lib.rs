//! Core types and traits for seedbed
//!
//! This crate defines the foundational pieces shared by every layer:
//! - Data model: CollectionKind, CollectionSpec, SeedBatch, Fixture, InstanceRef
//! - Configuration: ConnectionConfig, Timeouts, InstanceSpec
//! - Deadlines: Clock, CancelToken, Deadline, Interrupt
//! - Traits: Connector, DatabaseClient, Database, InstanceManager
//! - Error: ClientError, ConfigError

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod deadline;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{ConnectionConfig, InstanceSpec, Timeouts};
pub use deadline::{CancelToken, Clock, Deadline, Interrupt, ManualClock, SystemClock};
pub use error::{ClientError, ClientResult, ConfigError};
pub use traits::{Connector, Database, DatabaseClient, InstanceManager};
pub use types::{
    is_valid_database_name, unique_database_name, AdminUser, BindVars, CollectionKind,
    CollectionSpec, Fixture, InstanceRef, SeedBatch,
};
