//! Failed launches report the state they failed in and clean up

use crate::common::*;
use seedbed::{BootstrapError, CancelToken, HarnessState, LaunchFailure, Phase};
use std::sync::Arc;

#[test]
fn readiness_timeout_stops_the_instance() {
    init_tracing();
    let cluster = MemoryCluster::new().with_warmup_requests(1_000);
    let clock = Arc::new(ManualClock::new());
    let harness = memory_harness_with_clock(&cluster, clock.clone());

    let err = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap_err();

    assert_eq!(err.state, HarnessState::AwaitingReady);
    assert!(matches!(
        err.bootstrap(),
        Some(BootstrapError::Unreachable { .. })
    ));
    assert_eq!(cluster.stop_count(), 1);
    assert!(err.logs.contains("refused, server starting"));
    // readiness budget from fast_timeouts
    assert_eq!(clock.elapsed(), std::time::Duration::from_millis(2_000));
}

#[test]
fn provisioning_failure_stops_the_instance() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let fixture = empty_order_fixture().with_seed(r#"INSERT {"_key": "u1"} INTO missing"#);

    let err = harness
        .launch(&unique_database_name("orders"), &fixture)
        .unwrap_err();

    assert_eq!(err.state, HarnessState::Provisioning);
    assert_eq!(err.bootstrap().and_then(|e| e.phase()), Some(Phase::Seed));
    assert_eq!(cluster.start_count(), 1);
    assert_eq!(cluster.stop_count(), 1);
    assert!(err.logs.contains("launch failed"));
}

#[test]
fn instance_start_failure_is_reported() {
    let cluster = MemoryCluster::new();
    cluster.set_fail_start(true);
    let harness = memory_harness(&cluster);

    let err = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap_err();

    assert_eq!(err.state, HarnessState::InstanceStarting);
    assert!(matches!(err.source, LaunchFailure::Instance(_)));
    assert_eq!(cluster.start_count(), 0);
    assert_eq!(cluster.stop_count(), 0);
}

#[test]
fn invalid_database_name_fails_before_any_instance_starts() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);

    let err = harness.launch("9 bad/name", &order_fixture()).unwrap_err();

    assert_eq!(err.state, HarnessState::Uninitialized);
    assert!(matches!(err.source, LaunchFailure::Config(_)));
    assert_eq!(cluster.start_count(), 0);
}

#[test]
fn cancelled_harness_aborts_while_awaiting_ready() {
    let cluster = MemoryCluster::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let harness = memory_harness(&cluster).with_cancel(cancel);

    let err = harness
        .launch(&unique_database_name("orders"), &order_fixture())
        .unwrap_err();

    assert_eq!(err.state, HarnessState::AwaitingReady);
    assert!(err.bootstrap().is_some_and(|e| e.is_cancelled()));
    assert_eq!(cluster.stop_count(), 1);
}

#[test]
fn mismatched_root_password_is_rejected_up_front() {
    let cluster = MemoryCluster::new();
    let config = HarnessConfig {
        root_password: "not-the-container-password".to_string(),
        ..HarnessConfig::default()
    };

    let result = Harness::new(config, Arc::new(cluster.clone()), cluster);
    assert!(result.is_err());
}
