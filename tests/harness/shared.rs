//! Several environments on one long-lived instance

use crate::common::*;
use seedbed::HarnessState;

#[test]
fn environments_on_a_shared_instance_are_isolated() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let shared = harness.start_shared().unwrap();

    let a = harness
        .launch_on(&shared, &unique_database_name("orders"), &order_fixture())
        .unwrap();
    let b = harness
        .launch_on(&shared, &unique_database_name("orders"), &order_fixture())
        .unwrap();

    assert_eq!(a.instance, b.instance);
    assert_ne!(a.database, b.database);
    assert_eq!(count(&a.db, "user"), 1);
    assert_eq!(count(&b.db, "user"), 1);
    assert_eq!(cluster.start_count(), 1);
    assert_eq!(
        a.history(),
        vec![
            HarnessState::Uninitialized,
            HarnessState::AwaitingReady,
            HarnessState::Provisioning,
            HarnessState::Ready,
        ]
    );
}

#[test]
fn teardown_leaves_the_shared_instance_running() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let shared = harness.start_shared().unwrap();

    let env = harness
        .launch_on(&shared, &unique_database_name("orders"), &order_fixture())
        .unwrap();
    env.teardown.run();
    assert_eq!(env.state(), HarnessState::TornDown);
    assert_eq!(cluster.stop_count(), 0);
    assert_eq!(count(&env.db, "user"), 1);

    shared.stop().unwrap();
    shared.stop().unwrap();
    assert_eq!(cluster.stop_count(), 1);
}

#[test]
fn failure_on_a_shared_instance_does_not_stop_it() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let shared = harness.start_shared().unwrap();
    let fixture = empty_order_fixture().with_seed("INSERT 42 INTO user");

    let err = harness
        .launch_on(&shared, &unique_database_name("orders"), &fixture)
        .unwrap_err();
    assert_eq!(err.state, HarnessState::Provisioning);
    assert_eq!(cluster.stop_count(), 0);
    assert!(shared.logs().contains("server"));

    drop(shared);
    assert_eq!(cluster.stop_count(), 1);
}
