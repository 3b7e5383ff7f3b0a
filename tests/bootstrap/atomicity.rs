//! A seed script applies completely or not at all

use crate::common::*;
use seedbed::{seed, BootstrapError, SeedBatch, DEFAULT_SEED_TIMEOUT};

fn seeded_db(test: &TestInstance) -> MemoryDatabase {
    test.provisioner()
        .provision(&test.config, "orders", &empty_order_fixture(), &deadline())
        .unwrap()
        .db
}

/// Statement `k` of `n` repeats the first key; nothing may remain
#[test]
fn failing_statement_at_any_position_leaves_no_trace() {
    let n = 6;
    for k in 2..=n {
        let test = TestInstance::start();
        let db = seeded_db(&test);

        let statements: Vec<String> = (1..=n)
            .map(|i| {
                let key = if i == k { 1 } else { i };
                format!(r#"INSERT {{"_key": "o{key}"}} INTO order"#)
            })
            .collect();
        let batch = SeedBatch::new(statements.join("\n"));

        let err = seed(&db, &batch, &deadline(), DEFAULT_SEED_TIMEOUT).unwrap_err();
        match err {
            BootstrapError::Seed { cause, .. } => {
                let message = cause.to_string();
                assert!(message.contains(&format!("statement {k}")), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(count(&db, "order"), 0, "k = {k}");
    }
}

#[test]
fn invalid_edge_rolls_back_documents() {
    let test = TestInstance::start();
    let db = seeded_db(&test);
    let batch = SeedBatch::new(
        r#"
        INSERT {"_key": "u1"} INTO user
        INSERT {"_from": "user/u1"} INTO placed
        "#,
    );

    let err = seed(&db, &batch, &deadline(), DEFAULT_SEED_TIMEOUT).unwrap_err();
    match err {
        BootstrapError::Seed { script, cause } => {
            assert!(script.contains("INTO placed"));
            assert!(matches!(cause, ClientError::Query(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&db, "user"), 0);
    assert_eq!(count(&db, "placed"), 0);
}

#[test]
fn syntax_error_applies_nothing() {
    let test = TestInstance::start();
    let db = seeded_db(&test);
    let batch = SeedBatch::new(r#"INSERT {"_key": "u1"} INTO user UPSERT nonsense"#);

    let err = seed(&db, &batch, &deadline(), DEFAULT_SEED_TIMEOUT).unwrap_err();
    match err {
        BootstrapError::Seed { cause, .. } => {
            assert!(matches!(cause, ClientError::Http { status: 400, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(count(&db, "user"), 0);
}
