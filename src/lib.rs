//! Seedbed - database bootstrap and disposable integration-test environments
//!
//! Seedbed brings a document/graph database (ArangoDB-style) to a known
//! state: it waits for the server, creates a logical database, ensures
//! document and edge collections, and loads seed data as one transaction.
//! On top of that, the harness owns a disposable instance per test run and
//! hands out signed test credentials.
//!
//! # Quick Start
//!
//! ```ignore
//! use seedbed::{Fixture, Harness, HarnessConfig, MemoryCluster, unique_database_name};
//! use std::sync::Arc;
//!
//! let cluster = MemoryCluster::new();
//! let harness = Harness::new(HarnessConfig::default(), Arc::new(cluster.clone()), cluster)?;
//!
//! let fixture = Fixture::new(["user", "order"], ["placed"])
//!     .with_seed(r#"INSERT {"_key": "u1"} INTO user"#);
//! let env = harness.launch(&unique_database_name("orders"), &fixture)?;
//!
//! let token = env.token("u1", ["USER"])?;
//! env.teardown.run();
//! ```
//!
//! # Architecture
//!
//! - `seedbed-core`: data model, configuration, deadlines, client traits
//! - `seedbed-memory`: in-memory reference server
//! - `seedbed-arango`: ArangoDB HTTP client
//! - `seedbed-bootstrap`: readiness, migration, seeding, provisioning
//! - `seedbed-harness`: lifecycle, log capture, credentials, Docker instances

pub use seedbed_arango::{ArangoClient, ArangoConnector, ArangoDatabase};
pub use seedbed_bootstrap::{
    check_ready, migrate, seed, BootstrapError, DatabaseOf, MigrationReport, Phase, Provisioned,
    Provisioner, Readiness, SeedReport, StatusChecker, DEFAULT_BASE_INTERVAL,
    DEFAULT_COLLECTION_TIMEOUT, DEFAULT_SEED_TIMEOUT,
};
pub use seedbed_core::*;
pub use seedbed_harness::{
    auth, Authenticator, Claims, Harness, HarnessConfig, HarnessError, HarnessState, KeyStore,
    LaunchFailure, LogCapture, SharedInstance, SigningError, Teardown, TestEnv, TokenError, BANNER,
};
#[cfg(feature = "docker")]
pub use seedbed_harness::{docker_harness, DockerInstances};
pub use seedbed_memory::{MemoryClient, MemoryCluster, MemoryDatabase, MemoryServer, QueryError};
