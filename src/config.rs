//! Node configuration
//!
//! Built-in defaults, optionally overridden by a TOML file. Only
//! operational knobs live here; protocol constants are hard-coded in
//! `constants` and never configurable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Recognized node options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Allow forging when no peers are known
    pub offline_generation: bool,
    /// Minimum gap between forging attempts, in milliseconds
    pub block_generation_delay_ms: u64,
    /// How many recent block ids a sync request carries
    pub max_blocks_chunks: usize,
    /// Leaf size of the authenticated segment store, in bytes
    pub segment_size: usize,
    /// Optional data file to authenticate in the segment store
    pub dataset_file: Option<PathBuf>,
    /// Directory holding the node's persistent state
    pub tree_dir: PathBuf,
    /// Cap on transactions packed into a forged block
    pub max_transactions_per_block: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            offline_generation: false,
            block_generation_delay_ms: 1_000,
            max_blocks_chunks: 10,
            segment_size: 1024,
            dataset_file: None,
            tree_dir: PathBuf::from("data/ember"),
            max_transactions_per_block: 100,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// The forging cadence as a duration
    pub fn block_generation_delay(&self) -> Duration {
        Duration::from_millis(self.block_generation_delay_ms)
    }
}
