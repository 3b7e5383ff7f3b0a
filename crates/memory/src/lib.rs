//! In-memory document/graph server for seedbed
//!
//! A dependency-free stand-in for a real database server that implements
//! the seedbed client and instance-manager traits:
//! - [`MemoryServer`]: one server with databases, collections and a request log
//! - [`MemoryCluster`]: starts servers like container instances and connects to them
//! - a transactional query engine for seed scripts (see [`QueryError`])
//!
//! ```ignore
//! let cluster = MemoryCluster::new();
//! let instance = cluster.start_instance(&InstanceSpec::default())?;
//! let client = cluster.connect(&ConnectionConfig::for_instance(&instance, "root", "arangodb"))?;
//! ```

#![warn(missing_docs)]

mod cluster;
mod query;
mod server;
mod store;

pub use cluster::{MemoryCluster, MEMORY_HOST};
pub use query::{codes, QueryError};
pub use server::{MemoryClient, MemoryDatabase, MemoryServer, ROOT_USER, SYSTEM_DATABASE};
