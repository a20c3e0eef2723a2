//! Scan configuration

use serde::{Deserialize, Serialize};

use crate::directories::ReadMode;
use crate::{Error, Result};

/// Default number of doc ids dispatched to aggregation functions per batch.
pub const DEFAULT_AGGREGATION_BATCH_SIZE: usize = 5000;

/// Knobs for loading columns and driving scans.
///
/// Usually deserialized from JSON at the serving boundary:
///
/// ```text
/// { "read_mode": "mmap", "aggregation_batch_size": 4096 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How column files are brought into memory.
    pub read_mode: ReadMode,
    /// Capacity of the doc-id buffer in `AggregationService`.
    pub aggregation_batch_size: usize,
    /// Block granularity for `next_block_at`. `None` = one block per column.
    pub docs_per_block: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::default(),
            aggregation_batch_size: DEFAULT_AGGREGATION_BATCH_SIZE,
            docs_per_block: None,
        }
    }
}

impl ScanConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ScanConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.aggregation_batch_size == 0 {
            return Err(Error::Config(
                "aggregation_batch_size must be greater than zero".into(),
            ));
        }
        if self.docs_per_block == Some(0) {
            return Err(Error::Config(
                "docs_per_block must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
