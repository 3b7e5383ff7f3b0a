//! Bootstrap Integration Test Suite
//!
//! Exercises readiness polling, migration, seeding and provisioning end to
//! end against the in-memory reference server.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test bootstrap
//! cargo test --test bootstrap provisioning::
//! ```

#[path = "../common/mod.rs"]
mod common;

mod atomicity;
mod deadlines;
mod idempotence;
mod provisioning;
