//! Index schema registry.
//!
//! Search-index schemas are declared once at startup, before the node accepts
//! traffic. Each index name may be declared only once.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::constants;
use crate::error::{Error, Result};

/// Shape of one search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDefinition {
    pub name: String,
    /// Primary shard count.
    pub shards: u32,
    /// Replicas per primary.
    pub replicas: u32,
}

impl IndexDefinition {
    fn new(name: String) -> Self {
        Self {
            name,
            shards: constants::DEFAULT_SHARDS,
            replicas: constants::DEFAULT_REPLICAS,
        }
    }

    /// Set the primary shard count.
    pub fn with_shards(&mut self, shards: u32) -> &mut Self {
        self.shards = shards.max(1);
        self
    }

    /// Set the replica count.
    pub fn with_replicas(&mut self, replicas: u32) -> &mut Self {
        self.replicas = replicas;
        self
    }

    /// Total shard copies (primaries plus replicas), saturating at `u32::MAX`.
    pub fn total_shards(&self) -> u32 {
        self.shards.saturating_mul(self.replicas.saturating_add(1))
    }
}

/// Name-unique collection of index definitions.
#[derive(Debug, Clone, Default)]
pub struct IndexRegistry {
    indices: BTreeMap<String, IndexDefinition>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a new index and return its definition for further tuning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexAlreadyExists`] if `name` was declared before.
    pub fn create(&mut self, name: impl Into<String>) -> Result<&mut IndexDefinition> {
        let name = name.into();
        if self.indices.contains_key(&name) {
            return Err(Error::IndexAlreadyExists { name });
        }

        debug!(index = %name, "Declared index");
        Ok(self
            .indices
            .entry(name.clone())
            .or_insert_with(|| IndexDefinition::new(name)))
    }

    /// All declared indices, by name.
    pub fn get_indices(&self) -> &BTreeMap<String, IndexDefinition> {
        &self.indices
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Consume the registry into its definitions, in name order.
    pub fn into_definitions(self) -> Vec<IndexDefinition> {
        self.indices.into_values().collect()
    }
}
