//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::{Arc, Once};
use std::time::Duration;

pub use seedbed::{
    unique_database_name, AdminUser, BindVars, ClientError, Clock, CollectionKind,
    ConnectionConfig, Connector, Database, DatabaseClient, Deadline, Fixture, Harness,
    HarnessConfig, InstanceManager, InstanceRef, InstanceSpec, ManualClock, MemoryCluster,
    MemoryDatabase, MemoryServer, Provisioner, SystemClock, Timeouts,
};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test writer once per binary
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

// ============================================================================
// Fixtures
// ============================================================================

/// Seed inserting one user, one order and the edge between them
pub const ORDER_SEED: &str = r#"
INSERT {"_key": "u1", "name": "Ada"} INTO user
INSERT {"_key": "o1", "total": 42} INTO order
INSERT {"_from": "user/u1", "_to": "order/o1"} INTO placed
"#;

/// `user`, `order` (documents) and `placed` (edge) with [`ORDER_SEED`]
pub fn order_fixture() -> Fixture {
    Fixture::new(["user", "order"], ["placed"]).with_seed(ORDER_SEED)
}

/// Same collections, no seed data
pub fn empty_order_fixture() -> Fixture {
    Fixture::new(["user", "order"], ["placed"])
}

/// Number of documents in `collection`, read through the query interface
pub fn count(db: &impl Database, collection: &str) -> u64 {
    let rows = db
        .run_query(&format!("RETURN LENGTH({collection})"), &BindVars::new(), &deadline())
        .unwrap();
    rows[0].as_u64().unwrap()
}

// ============================================================================
// Deadlines
// ============================================================================

/// Generous wall-clock deadline
pub fn deadline() -> Deadline {
    Deadline::after(Arc::new(SystemClock), Duration::from_secs(10))
}

/// Virtual clock plus a deadline `timeout` ahead on it
pub fn manual_deadline(timeout: Duration) -> (Arc<ManualClock>, Deadline) {
    let clock = Arc::new(ManualClock::new());
    let deadline = Deadline::after(clock.clone(), timeout);
    (clock, deadline)
}

// ============================================================================
// Memory-backed setups
// ============================================================================

/// A running in-memory instance with the default root password
pub struct TestInstance {
    pub cluster: MemoryCluster,
    pub instance: InstanceRef,
    pub config: ConnectionConfig,
}

impl TestInstance {
    pub fn start() -> Self {
        Self::start_in(MemoryCluster::new())
    }

    pub fn start_in(cluster: MemoryCluster) -> Self {
        let instance = cluster.start_instance(&InstanceSpec::default()).unwrap();
        let config = ConnectionConfig::for_instance(&instance, "root", "arangodb");
        Self {
            cluster,
            instance,
            config,
        }
    }

    pub fn server(&self) -> MemoryServer {
        self.cluster.server(&self.instance).unwrap()
    }

    pub fn provisioner(&self) -> Provisioner<MemoryCluster> {
        Provisioner::new(self.cluster.clone(), AdminUser::new("arangodb", "arangodb"))
    }
}

/// Timeouts small enough for failure tests on a virtual clock
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        readiness_ms: 2_000,
        ..Timeouts::default()
    }
}

/// Harness over `cluster`, reading time from `clock`
pub fn memory_harness_with_clock(
    cluster: &MemoryCluster,
    clock: Arc<dyn Clock>,
) -> Harness<MemoryCluster> {
    let config = HarnessConfig {
        timeouts: fast_timeouts(),
        ..HarnessConfig::default()
    };
    Harness::new(config, Arc::new(cluster.clone()), cluster.clone())
        .unwrap()
        .with_clock(clock)
}

/// Harness over `cluster` on the wall clock
pub fn memory_harness(cluster: &MemoryCluster) -> Harness<MemoryCluster> {
    memory_harness_with_clock(cluster, Arc::new(SystemClock))
}
