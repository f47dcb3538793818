use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Maximum number of samples per bucket. Fixed for the lifetime of a store.
    pub capacity: i64,
    /// Snapshot loaded on open (when present) and written on shutdown.
    pub snapshot_path: Option<PathBuf>,
    /// Create the range and open-bucket indexes when the store opens.
    pub create_indexes_on_open: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self { capacity: 200, snapshot_path: None, create_indexes_on_open: true }
    }
}

impl BucketConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Returns the capacity as a bucket size, failing fast when it is not positive.
    pub fn validate(&self) -> Result<usize> {
        if self.capacity <= 0 {
            return Err(Error::CapacityMisconfigured { capacity: self.capacity });
        }
        usize::try_from(self.capacity)
            .map_err(|_| Error::CapacityMisconfigured { capacity: self.capacity })
    }
}
