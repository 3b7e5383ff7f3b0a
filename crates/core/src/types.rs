//! Data model for bootstrapping a database
//!
//! - CollectionKind / CollectionSpec: what the migrator ensures exists
//! - SeedBatch: one transactional script plus its bind variables
//! - Fixture: everything a test run needs created and loaded
//! - InstanceRef: a running database process

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// Bind variables passed alongside a query
pub type BindVars = serde_json::Map<String, serde_json::Value>;

/// Maximum length of a logical database name
pub const MAX_DATABASE_NAME_LENGTH: usize = 64;

/// Kind of a named collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Semi-structured records with no link structure
    Document,
    /// Directed relationships between two documents
    Edge,
}

impl CollectionKind {
    /// Numeric type code used on the wire (2 = document, 3 = edge)
    pub fn wire_type(self) -> u32 {
        match self {
            CollectionKind::Document => 2,
            CollectionKind::Edge => 3,
        }
    }

    /// Inverse of [`CollectionKind::wire_type`]
    pub fn from_wire(code: u32) -> Option<Self> {
        match code {
            2 => Some(CollectionKind::Document),
            3 => Some(CollectionKind::Edge),
            _ => None,
        }
    }

    /// Lowercase name, as used in log fields and error messages
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionKind::Document => "document",
            CollectionKind::Edge => "edge",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A collection the schema must contain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name, unique within a database
    pub name: String,
    /// Document or edge
    pub kind: CollectionKind,
}

impl CollectionSpec {
    /// Document collection named `name`
    pub fn document(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CollectionKind::Document,
        }
    }

    /// Edge collection named `name`
    pub fn edge(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CollectionKind::Edge,
        }
    }
}

/// Seed statements executed as a single transactional query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedBatch {
    /// Query-language script
    pub script: String,
    /// Values referenced as `@name` / `@@name` in the script
    #[serde(default)]
    pub bind_vars: BindVars,
}

impl SeedBatch {
    /// Batch with no bind variables
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            bind_vars: BindVars::new(),
        }
    }

    /// Add a bind variable
    pub fn with_bind_var(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.bind_vars.insert(name.into(), value);
        self
    }

    /// True when the script contains nothing but whitespace
    pub fn is_empty(&self) -> bool {
        self.script.trim().is_empty()
    }
}

/// Collections and seed data for one test run
///
/// ```toml
/// document_collections = ["user", "order"]
/// edge_collections = ["placed"]
/// seed = """
/// INSERT {"_key": "u1", "name": "Ann"} INTO user
/// """
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Document collections, created first
    #[serde(default)]
    pub document_collections: Vec<String>,
    /// Edge collections, created after documents
    #[serde(default)]
    pub edge_collections: Vec<String>,
    /// Seed script run after migration
    #[serde(default)]
    pub seed: String,
    /// Bind variables for the seed script
    #[serde(default)]
    pub seed_bind_vars: BindVars,
}

impl Fixture {
    /// Fixture creating the given collections with no seed data
    pub fn new<D, E>(documents: D, edges: E) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            document_collections: documents.into_iter().map(Into::into).collect(),
            edge_collections: edges.into_iter().map(Into::into).collect(),
            seed: String::new(),
            seed_bind_vars: BindVars::new(),
        }
    }

    /// Set the seed script
    pub fn with_seed(mut self, script: impl Into<String>) -> Self {
        self.seed = script.into();
        self
    }

    /// All collections in creation order: documents, then edges
    pub fn collections(&self) -> Vec<CollectionSpec> {
        self.document_collections
            .iter()
            .map(CollectionSpec::document)
            .chain(self.edge_collections.iter().map(CollectionSpec::edge))
            .collect()
    }

    /// The seed script as a batch
    pub fn seed_batch(&self) -> SeedBatch {
        SeedBatch {
            script: self.seed.clone(),
            bind_vars: self.seed_bind_vars.clone(),
        }
    }

    /// Parse a fixture from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let fixture: Fixture = toml::from_str(text)?;
        fixture.validate()?;
        Ok(fixture)
    }

    /// Read and parse a fixture file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject empty collection names and names listed twice
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for spec in self.collections() {
            if spec.name.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "collections",
                    reason: format!("empty {} collection name", spec.kind),
                });
            }
            if !seen.insert(spec.name.clone()) {
                return Err(ConfigError::Invalid {
                    field: "collections",
                    reason: format!("collection '{}' listed more than once", spec.name),
                });
            }
        }
        Ok(())
    }
}

/// User attached to a newly created database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    /// Login name
    pub username: String,
    /// Password
    pub password: String,
}

impl AdminUser {
    /// Construct from name and password
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Handle to a running database process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    /// Manager-specific identifier (container id, in-memory id)
    pub id: String,
    /// Host the instance is reachable on
    pub host: String,
    /// Host-side port
    pub port: u16,
}

impl InstanceRef {
    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Whether `name` is usable as a logical database name
///
/// Names start with a letter, continue with letters, digits, `_` or `-`,
/// and are at most [`MAX_DATABASE_NAME_LENGTH`] characters long.
pub fn is_valid_database_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    name.len() <= MAX_DATABASE_NAME_LENGTH
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Database name unique to this run: `prefix_<uuid>`
pub fn unique_database_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let keep = MAX_DATABASE_NAME_LENGTH.saturating_sub(suffix.len() + 1);
    let prefix: String = prefix
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(keep)
        .collect();
    if prefix.is_empty() || !prefix.starts_with(|c: char| c.is_ascii_alphabetic()) {
        format!("t{}_{}", &prefix[..prefix.len().min(keep.saturating_sub(1))], suffix)
    } else {
        format!("{prefix}_{suffix}")
    }
}
