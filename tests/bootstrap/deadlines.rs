//! Deadlines, backoff and cancellation across the bootstrap sequence

use crate::common::*;
use seedbed::{check_ready, BootstrapError, CancelToken, Phase, DEFAULT_BASE_INTERVAL};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn zero_deadline_returns_without_probing() {
    let test = TestInstance::start();
    let client = test.cluster.connect(&test.config).unwrap();
    let deadline = Deadline::expired(Arc::new(ManualClock::new()));

    let err = check_ready(&client, "memory", &deadline, DEFAULT_BASE_INTERVAL).unwrap_err();
    assert!(matches!(err, BootstrapError::Unreachable { attempts: 0, .. }));
    assert!(!test
        .server()
        .logs()
        .iter()
        .any(|line| line.starts_with("list_databases")));
}

#[test]
fn warming_server_is_polled_with_linear_backoff() {
    let test = TestInstance::start_in(MemoryCluster::new().with_warmup_requests(4));
    let (clock, deadline) = manual_deadline(Duration::from_secs(10));

    let provisioned = test
        .provisioner()
        .provision(&test.config, "orders", &order_fixture(), &deadline)
        .unwrap();
    assert_eq!(provisioned.readiness.attempts, 5);
    assert_eq!(
        clock.sleeps(),
        [100, 200, 300, 400].map(Duration::from_millis).to_vec()
    );
    assert_eq!(provisioned.readiness.waited, Duration::from_millis(1000));
}

#[test]
fn slow_seed_is_bounded_by_its_own_timeout() {
    let test = TestInstance::start();
    test.server().set_latency("run_query", Duration::from_secs(30));
    let (clock, deadline) = manual_deadline(Duration::from_secs(60));

    let err = test
        .provisioner()
        .provision(&test.config, "orders", &order_fixture(), &deadline)
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Seed));
    assert!(err.is_timeout());
    // default seed bound is 5s
    assert_eq!(clock.elapsed(), Duration::from_secs(5));
    assert_eq!(test.server().document_count("orders", "user"), Some(0));
}

#[test]
fn overall_deadline_caps_per_call_timeouts() {
    let test = TestInstance::start();
    test.server().set_latency("collection:order", Duration::from_secs(30));
    let (clock, deadline) = manual_deadline(Duration::from_millis(400));

    let err = test
        .provisioner()
        .provision(&test.config, "orders", &order_fixture(), &deadline)
        .unwrap_err();
    assert_eq!(err.phase(), Some(Phase::Migrate));
    assert!(err.is_timeout());
    assert_eq!(clock.elapsed(), Duration::from_millis(400));
}

#[test]
fn cancellation_is_reported_as_cancelled() {
    let test = TestInstance::start();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = test
        .provisioner()
        .provision(
            &test.config,
            "orders",
            &order_fixture(),
            &deadline().with_cancel(cancel),
        )
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(test.server().collection_names("orders").is_none());
}
