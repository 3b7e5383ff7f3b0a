//! ArangoDB HTTP client for seedbed
//!
//! Implements [`seedbed_core::Connector`], [`seedbed_core::DatabaseClient`] and
//! [`seedbed_core::Database`] against the ArangoDB REST API with basic
//! authentication. Every call is bounded by the caller's [`seedbed_core::Deadline`].

#![warn(missing_docs)]

mod client;
mod http;

pub use client::{ArangoClient, ArangoConnector, ArangoDatabase};
