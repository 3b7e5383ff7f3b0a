//! Re-running the bootstrap converges without errors or duplicates

use crate::common::*;
use seedbed::{migrate, DEFAULT_COLLECTION_TIMEOUT};

#[test]
fn migrate_twice_creates_no_duplicates() {
    let test = TestInstance::start();
    let db = test
        .provisioner()
        .provision(&test.config, "orders", &Fixture::default(), &deadline())
        .unwrap()
        .db;
    let docs = vec!["user".to_string(), "order".to_string()];
    let edges = vec!["placed".to_string()];

    let first = migrate(&db, &docs, &edges, &deadline(), DEFAULT_COLLECTION_TIMEOUT).unwrap();
    let second = migrate(&db, &docs, &edges, &deadline(), DEFAULT_COLLECTION_TIMEOUT).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        test.server().collection_names("orders").unwrap(),
        vec!["order", "placed", "user"]
    );
}

#[test]
fn provisioning_an_existing_database_reopens_it() {
    let test = TestInstance::start();
    let provisioner = test.provisioner();

    let first = provisioner
        .provision(&test.config, "orders", &order_fixture(), &deadline())
        .unwrap();
    assert!(first.created);

    let second = provisioner
        .provision(&test.config, "orders", &empty_order_fixture(), &deadline())
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.migration.len(), 3);
    assert_eq!(count(&second.db, "user"), 1);
}

#[test]
fn reseeding_the_same_keys_fails_without_side_effects() {
    let test = TestInstance::start();
    let provisioner = test.provisioner();
    provisioner
        .provision(&test.config, "orders", &order_fixture(), &deadline())
        .unwrap();

    // seed data is not idempotent: the same keys violate the unique constraint
    let err = provisioner
        .provision(&test.config, "orders", &order_fixture(), &deadline())
        .unwrap_err();
    assert_eq!(err.phase(), Some(seedbed::Phase::Seed));

    let db = test
        .cluster
        .connect(&test.config)
        .unwrap()
        .database("orders", &deadline())
        .unwrap();
    assert_eq!(count(&db, "user"), 1);
    assert_eq!(count(&db, "placed"), 1);
}
