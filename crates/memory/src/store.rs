//! In-memory storage layout: databases hold collections hold documents

use seedbed_core::CollectionKind;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Documents of one collection, keyed by `_key`
#[derive(Debug, Clone)]
pub(crate) struct Collection {
    pub kind: CollectionKind,
    pub documents: BTreeMap<String, Value>,
    last_key: u64,
}

impl Collection {
    pub fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            documents: BTreeMap::new(),
            last_key: 0,
        }
    }

    /// Next generated key not already taken by an explicit `_key`
    pub fn generate_key(&mut self) -> String {
        loop {
            self.last_key += 1;
            let key = self.last_key.to_string();
            if !self.documents.contains_key(&key) {
                return key;
            }
        }
    }
}

/// One logical database
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub collections: BTreeMap<String, Collection>,
    /// Non-root users granted access
    pub users: BTreeSet<String>,
}
