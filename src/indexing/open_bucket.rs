use crate::storage::BucketId;

/// Entry for a device's currently open bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenEntry {
    pub bucket: BucketId,
    pub slot: usize,
    pub count: usize,
}

/// Filtered index holding only buckets with `count < capacity`.
///
/// Each device shard owns one, so it holds at most one entry: a device never
/// has more than one open bucket. The entry is dropped as soon as the bucket
/// reaches capacity.
#[derive(Debug, Clone)]
pub struct OpenBucketIndex {
    capacity: usize,
    entry: Option<OpenEntry>,
}

impl OpenBucketIndex {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entry: None }
    }

    pub fn lookup(&self) -> Option<OpenEntry> {
        self.entry
    }

    /// Records the bucket's new count, removing it once it is full.
    pub fn record(&mut self, bucket: BucketId, slot: usize, count: usize) {
        self.entry = if count < self.capacity { Some(OpenEntry { bucket, slot, count }) } else { None };
    }

    pub fn len(&self) -> usize {
        usize::from(self.entry.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}
