//! Signed test credentials

use crate::common::*;
use seedbed::TokenError;

#[test]
fn issued_tokens_validate_with_roles() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let env = harness
        .launch(&unique_database_name("orders"), &empty_order_fixture())
        .unwrap();

    let token = env.token("42", ["USER", "ADMIN"]).unwrap();
    let claims = env.auth.validate_token(&token).unwrap();
    assert_eq!(claims.sub, "42");
    assert!(claims.has_role("ADMIN"));
    assert_eq!(claims.exp - claims.iat, 3_600);
}

#[test]
fn invalid_token_is_rejected() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let env = harness
        .launch(&unique_database_name("orders"), &empty_order_fixture())
        .unwrap();

    let token = env.invalid_token().unwrap();
    assert!(matches!(
        env.auth.validate_token(&token),
        Err(TokenError::BadSignature)
    ));
}

#[test]
fn environments_of_one_harness_share_the_key() {
    let cluster = MemoryCluster::new();
    let harness = memory_harness(&cluster);
    let a = harness
        .launch(&unique_database_name("a"), &empty_order_fixture())
        .unwrap();
    let b = harness
        .launch(&unique_database_name("b"), &empty_order_fixture())
        .unwrap();

    let token = a.token("7", ["USER"]).unwrap();
    assert!(b.auth.validate_token(&token).is_ok());
    assert!(harness.authenticator().validate_token(&token).is_ok());
}

#[test]
fn tokens_from_another_harness_fail() {
    let cluster = MemoryCluster::new();
    let ours = memory_harness(&cluster);
    let theirs = memory_harness(&cluster);

    let token = theirs.authenticator().issue_token("7", ["USER"]).unwrap();
    assert!(matches!(
        ours.authenticator().validate_token(&token),
        Err(TokenError::BadSignature)
    ));
}
