//! Happy path and teardown behavior

use crate::common::*;
use seedbed::{HarnessState, BANNER};

#[test]
fn launch_reaches_ready_with_seeded_database() {
    init_tracing();
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);

    let env = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap();

    assert_eq!(count(&env.db, "user"), 1);
    assert_eq!(count(&env.db, "order"), 1);
    assert_eq!(count(&env.db, "placed"), 1);
    assert_eq!(env.migration.len(), 3);
    assert!(env.seed.executed);
    assert_eq!(env.state(), HarnessState::Ready);
    assert_eq!(
        env.history(),
        vec![
            HarnessState::Uninitialized,
            HarnessState::InstanceStarting,
            HarnessState::AwaitingReady,
            HarnessState::Provisioning,
            HarnessState::Ready,
        ]
    );
    assert_eq!(cluster.start_count(), 1);
}

#[test]
fn teardown_stops_once_and_returns_the_same_logs() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let env = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap();

    let first = env.teardown.run();
    let second = env.teardown.run();
    assert_eq!(first, second);
    assert!(env.teardown.is_done());
    assert_eq!(cluster.stop_count(), 1);
    assert_eq!(env.state(), HarnessState::TornDown);

    assert!(first.starts_with(BANNER));
    assert!(first.contains("ready for testing"));
}

#[test]
fn dropping_the_environment_tears_it_down() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let env = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap();
    let server = cluster.server(&env.instance).unwrap();

    drop(env);
    assert_eq!(cluster.stop_count(), 1);
    assert!(!server.is_running());
}

#[test]
fn database_handle_fails_after_teardown() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let env = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap();
    env.teardown.run();

    let err = env
        .db
        .run_query("RETURN LENGTH(user)", &BindVars::new(), &deadline())
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
}

#[test]
fn log_capture_records_the_bring_up() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let env = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap();

    let logs = env.log.contents();
    assert!(logs.contains("seedbed::harness"));
    assert!(logs.contains("server ready"));
    assert!(logs.contains("database provisioned"));
    assert!(logs.contains("ready for testing"));

    env.log.append("custom line from the test");
    assert!(env.teardown.run().contains("custom line from the test"));
}

#[test]
fn launch_with_empty_seed_creates_only_collections() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let env = harness
        .launch(&unique_database_name("orders"), &empty_order_fixture())
        .unwrap();

    assert!(!env.seed.executed);
    let server = cluster.server(&env.instance).unwrap();
    assert_eq!(
        server.collection_names(&env.database).unwrap(),
        vec!["order", "placed", "user"]
    );
    assert_eq!(count(&env.db, "user"), 0);
}
