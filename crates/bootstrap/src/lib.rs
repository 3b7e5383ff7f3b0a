//! Bootstrap sequence for seedbed test databases
//!
//! Leaf-first:
//! - [`check_ready`]: poll a server with linear backoff until it answers
//! - [`migrate`]: idempotently ensure document and edge collections
//! - [`seed`]: load a fixture script as one transaction
//! - [`Provisioner`]: connect, wait, create-or-open the database, migrate, seed
//!
//! Every operation takes a [`seedbed_core::Deadline`]; each network call
//! gets a child deadline bounded by its own timeout.

#![warn(missing_docs)]

mod error;
mod migrate;
mod provision;
mod readiness;
mod seed;

pub use error::{BootstrapError, Phase, Result};
pub use migrate::{migrate, MigrationReport, DEFAULT_COLLECTION_TIMEOUT};
pub use provision::{DatabaseOf, Provisioned, Provisioner};
pub use readiness::{check_ready, Readiness, StatusChecker, DEFAULT_BASE_INTERVAL};
pub use seed::{seed, SeedReport, DEFAULT_SEED_TIMEOUT};
