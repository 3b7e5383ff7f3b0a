//! Harness integration tests: lifecycle, teardown, failure cleanup,
//! credentials and shared instances over the in-memory cluster.

#[path = "../common/mod.rs"]
mod common;

mod credentials;
mod failures;
mod lifecycle;
mod shared;
