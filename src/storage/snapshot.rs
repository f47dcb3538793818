//! Whole-store snapshots.
//!
//! Buckets are serialized with bincode into a single file. Indexes are not
//! persisted; they are rebuilt when the snapshot is opened.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::storage::{Bucket, BucketConfig, MemoryBucketStore};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    capacity: i64,
    buckets: Vec<Bucket>,
}

impl MemoryBucketStore {
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        if !self.is_available() {
            return Err(Error::unavailable("save_snapshot", None, "store is shut down"));
        }
        self.write_snapshot_file(path)
    }

    /// Opens a store from a snapshot written by [`MemoryBucketStore::save_snapshot`].
    /// The snapshot's capacity must match `config.capacity`.
    pub fn open_snapshot(path: &Path, config: BucketConfig) -> Result<Self> {
        let store = Self::empty(config)?;
        store.load_snapshot_file(path)?;
        store.finish_open()?;
        Ok(store)
    }

    pub(crate) fn write_snapshot_file(&self, path: &Path) -> Result<()> {
        let io_err = |e: std::io::Error| Error::unavailable("save_snapshot", None, e);

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            capacity: self.config().capacity,
            buckets: self.export_buckets()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write next to the target, then rename, so a crash never leaves a torn snapshot.
        let mut tmp_name = path.file_name().map(OsString::from).unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        let mut writer = BufWriter::new(File::create(&tmp_path).map_err(io_err)?);
        bincode::serialize_into(&mut writer, &snapshot)
            .map_err(|e| Error::unavailable("save_snapshot", None, e))?;
        writer.flush().map_err(io_err)?;
        drop(writer);
        std::fs::rename(&tmp_path, path).map_err(io_err)?;

        info!(path = %path.display(), buckets = snapshot.buckets.len(), "snapshot saved");
        Ok(())
    }

    pub(crate) fn load_snapshot_file(&self, path: &Path) -> Result<()> {
        let file = File::open(path).map_err(|e| Error::unavailable("load_snapshot", None, e))?;
        let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| Error::unavailable("load_snapshot", None, e))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::Config(format!(
                "snapshot version {} is not supported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        if snapshot.capacity != self.config().capacity {
            return Err(Error::Config(format!(
                "snapshot was written with capacity {} but the store is configured with {}",
                snapshot.capacity,
                self.config().capacity
            )));
        }

        let buckets = snapshot.buckets.len();
        self.restore(snapshot.buckets)?;
        info!(path = %path.display(), buckets, "snapshot loaded");
        Ok(())
    }
}
