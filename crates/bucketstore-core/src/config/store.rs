use crate::error::{Result, StoreError};
use crate::types::BucketId;
use serde::{Deserialize, Serialize};

/// Configuration for a bucket store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Index of this node in the cluster state (default: 0)
    ///
    /// Used by `set_cluster_state` to decide whether buckets stay active.
    #[serde(default)]
    pub node_index: u16,

    /// Maximum number of simultaneously open iterators (default: 1024)
    ///
    /// `create_iterator` fails with a transient `IteratorLimit` error once
    /// the limit is reached, until some iterator is destroyed.
    #[serde(default = "default_max_open_iterators")]
    pub max_open_iterators: usize,

    /// Byte budget for callers that do not choose their own (default: 4MB)
    #[serde(default = "default_iterate_bytes")]
    pub default_iterate_bytes: u64,

    /// Bit width of bucket ids produced by the default bucket-id factory
    /// (default: 58)
    #[serde(default = "default_distribution_bits")]
    pub distribution_bits: u8,
}

fn default_max_open_iterators() -> usize {
    1024
}

fn default_iterate_bytes() -> u64 {
    4 * 1024 * 1024
}

fn default_distribution_bits() -> u8 {
    BucketId::MAX_USED_BITS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            node_index: 0,
            max_open_iterators: default_max_open_iterators(),
            default_iterate_bytes: default_iterate_bytes(),
            distribution_bits: default_distribution_bits(),
        }
    }

    pub fn with_node_index(mut self, node_index: u16) -> Self {
        self.node_index = node_index;
        self
    }

    pub fn with_max_open_iterators(mut self, max: usize) -> Self {
        self.max_open_iterators = max;
        self
    }

    pub fn with_default_iterate_bytes(mut self, bytes: u64) -> Self {
        self.default_iterate_bytes = bytes;
        self
    }

    pub fn with_distribution_bits(mut self, bits: u8) -> Self {
        self.distribution_bits = bits;
        self
    }

    /// Load from a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_open_iterators == 0 {
            return Err(StoreError::Config(
                "max_open_iterators must be positive".to_string(),
            ));
        }
        if self.default_iterate_bytes == 0 {
            return Err(StoreError::Config(
                "default_iterate_bytes must be positive".to_string(),
            ));
        }
        if !(1..=BucketId::MAX_USED_BITS).contains(&self.distribution_bits) {
            return Err(StoreError::Config(format!(
                "distribution_bits must be within 1..={}, got {}",
                BucketId::MAX_USED_BITS,
                self.distribution_bits
            )));
        }
        Ok(())
    }
}
