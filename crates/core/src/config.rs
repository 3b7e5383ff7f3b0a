//! Configuration consumed by the bootstrap sequence
//!
//! All structs deserialize from TOML with defaults for every omitted field,
//! so a config file only needs the values that differ.
//!
//! ```toml
//! [connection]
//! host = "localhost:8529"
//! user = "root"
//! password = "arangodb"
//! disable_tls = true
//!
//! [timeouts]
//! readiness_ms = 10000
//! collection_call_ms = 1000
//! seed_ms = 5000
//! ```

use crate::error::ConfigError;
use crate::types::InstanceRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default ArangoDB port inside the container
pub const DEFAULT_PORT: u16 = 8529;

/// How to reach a database server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// `host:port`, optionally with a scheme
    #[serde(default = "default_host")]
    pub host: String,
    /// User for basic authentication
    #[serde(default = "default_user")]
    pub user: String,
    /// Password for basic authentication
    #[serde(default)]
    pub password: String,
    /// Speak plain HTTP when the host has no scheme
    #[serde(default = "default_true")]
    pub disable_tls: bool,
}

fn default_host() -> String {
    format!("localhost:{DEFAULT_PORT}")
}

fn default_user() -> String {
    "root".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: default_user(),
            password: String::new(),
            disable_tls: true,
        }
    }
}

impl ConnectionConfig {
    /// Config pointing at a running instance
    pub fn for_instance(instance: &InstanceRef, user: &str, password: &str) -> Self {
        Self {
            host: instance.address(),
            user: user.to_string(),
            password: password.to_string(),
            disable_tls: true,
        }
    }

    /// Base URL of the server
    ///
    /// Hosts that already carry a scheme are used verbatim, otherwise the
    /// scheme follows `disable_tls`.
    pub fn endpoint(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else if self.disable_tls {
            format!("http://{host}")
        } else {
            format!("https://{host}")
        }
    }

    /// Reject values that cannot produce a working client
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "connection.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "connection.user",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-call time bounds
///
/// Every network call gets its own bound; the readiness bound also caps the
/// whole bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Budget for the whole bootstrap, readiness polling included (default 10s)
    #[serde(default = "default_readiness_ms")]
    pub readiness_ms: u64,
    /// Linear backoff unit between readiness probes (default 100ms)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Bound for a single readiness probe (default 1s)
    #[serde(default = "default_probe_ms")]
    pub probe_ms: u64,
    /// Bound for database existence checks and creation (default 1s)
    #[serde(default = "default_database_call_ms")]
    pub database_call_ms: u64,
    /// Bound for each collection creation (default 1s)
    #[serde(default = "default_collection_call_ms")]
    pub collection_call_ms: u64,
    /// Bound for the seed query (default 5s)
    #[serde(default = "default_seed_ms")]
    pub seed_ms: u64,
}

fn default_readiness_ms() -> u64 {
    10_000
}

fn default_backoff_base_ms() -> u64 {
    100
}

fn default_probe_ms() -> u64 {
    1_000
}

fn default_database_call_ms() -> u64 {
    1_000
}

fn default_collection_call_ms() -> u64 {
    1_000
}

fn default_seed_ms() -> u64 {
    5_000
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            readiness_ms: default_readiness_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            probe_ms: default_probe_ms(),
            database_call_ms: default_database_call_ms(),
            collection_call_ms: default_collection_call_ms(),
            seed_ms: default_seed_ms(),
        }
    }
}

impl Timeouts {
    /// Overall bootstrap budget
    pub fn readiness(&self) -> Duration {
        Duration::from_millis(self.readiness_ms)
    }

    /// Backoff unit
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Single probe bound
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    /// Database call bound
    pub fn database_call(&self) -> Duration {
        Duration::from_millis(self.database_call_ms)
    }

    /// Collection call bound
    pub fn collection_call(&self) -> Duration {
        Duration::from_millis(self.collection_call_ms)
    }

    /// Seed query bound
    pub fn seed(&self) -> Duration {
        Duration::from_millis(self.seed_ms)
    }

    /// Every bound must be non-zero; backoff must be non-zero so polling
    /// never degenerates into a tight loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("timeouts.readiness_ms", self.readiness_ms),
            ("timeouts.backoff_base_ms", self.backoff_base_ms),
            ("timeouts.probe_ms", self.probe_ms),
            ("timeouts.database_call_ms", self.database_call_ms),
            ("timeouts.collection_call_ms", self.collection_call_ms),
            ("timeouts.seed_ms", self.seed_ms),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Container image and runtime settings for a database instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    /// Image name
    #[serde(default = "default_image")]
    pub image: String,
    /// Image tag
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Port the server listens on inside the container
    #[serde(default = "default_port")]
    pub port: u16,
    /// Environment variables
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,
    /// Extra server arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Log line that signals the server accepts connections
    #[serde(default = "default_ready_message")]
    pub ready_message: String,
}

fn default_image() -> String {
    "arangodb".to_string()
}

fn default_tag() -> String {
    "3.9.8".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([("ARANGO_ROOT_PASSWORD".to_string(), "arangodb".to_string())])
}

fn default_ready_message() -> String {
    "is ready for business".to_string()
}

impl Default for InstanceSpec {
    fn default() -> Self {
        Self {
            image: default_image(),
            tag: default_tag(),
            port: default_port(),
            env: default_env(),
            args: Vec::new(),
            ready_message: default_ready_message(),
        }
    }
}

impl InstanceSpec {
    /// `image:tag`
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}
