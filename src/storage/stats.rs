use crate::storage::Bucket;

/// Point-in-time counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub capacity: usize,
    pub devices: usize,
    pub buckets: usize,
    pub open_buckets: usize,
    pub closed_buckets: usize,
    pub samples: usize,
    pub range_index_entries: usize,
    pub open_index_entries: usize,
}

impl StoreStats {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, ..Default::default() }
    }

    pub(crate) fn record_bucket(&mut self, bucket: &Bucket) {
        self.buckets += 1;
        self.samples += bucket.count;
        if bucket.is_open(self.capacity) {
            self.open_buckets += 1;
        } else {
            self.closed_buckets += 1;
        }
    }

    /// Samples stored per bucket document. One document per sample would give
    /// 1.0; full buckets approach `capacity`.
    pub fn samples_per_bucket(&self) -> f64 {
        if self.buckets == 0 {
            0.0
        } else {
            self.samples as f64 / self.buckets as f64
        }
    }

    /// Index entries per stored sample. Bucketing keeps this well below 1.
    pub fn index_entries_per_sample(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            (self.range_index_entries + self.open_index_entries) as f64 / self.samples as f64
        }
    }
}
