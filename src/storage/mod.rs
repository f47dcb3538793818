//! Bucket documents and the store that owns them.
//!
//! [`BucketStore`] is the document-store seam: an atomic find-and-append with
//! upsert, index creation, and an overlap scan. [`MemoryBucketStore`] is the
//! embedded implementation.

use std::sync::Arc;

use crate::core::{Sample, Timestamp};
use crate::error::Result;
use crate::indexing::{IndexDefinition, IndexHandle};

pub mod bucket;
pub mod bucket_store;
pub mod snapshot;
pub mod stats;
pub mod util;

pub use bucket::{Bucket, BucketId, BucketRef, StoredSample};
pub use bucket_store::MemoryBucketStore;
pub use stats::StoreStats;
pub use util::BucketConfig;

/// Candidate buckets for an interval, ascending by `min_ts`.
#[derive(Debug, Clone)]
pub struct BucketScan {
    pub buckets: Vec<Arc<Bucket>>,
    /// The range index served the scan; otherwise every bucket of the device
    /// was checked and sorted in memory.
    pub used_range_index: bool,
}

pub trait BucketStore: Send + Sync {
    /// Bucket capacity this store was opened with.
    fn capacity(&self) -> usize;

    /// Finds the device's open bucket (or upserts a new one) and appends the
    /// sample, as one indivisible step. Exactly one bucket is mutated.
    fn atomic_append(&self, device_id: &str, sample: Sample) -> Result<BucketRef>;

    fn create_index(&self, definition: IndexDefinition) -> Result<IndexHandle>;

    /// Buckets of `device_id` whose span overlaps `[lo, hi]`, ascending by `min_ts`.
    fn find_overlapping(&self, device_id: &str, lo: Timestamp, hi: Timestamp) -> Result<BucketScan>;

    /// All buckets of a device in creation order.
    fn device_buckets(&self, device_id: &str) -> Result<Vec<Arc<Bucket>>>;

    fn stats(&self) -> Result<StoreStats>;
}
