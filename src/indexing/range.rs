use std::collections::BTreeMap;
use std::ops::Bound;

use crate::core::{Timestamp, MAX_TIMESTAMP};
use crate::storage::BucketId;

/// Composite key of the range index within one device.
///
/// The device component of `(device_id, min_ts, max_ts)` is implicit: each
/// device shard owns its own `RangeIndex`. The bucket id keeps keys unique
/// when two buckets share a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RangeKey {
    pub min_ts: Timestamp,
    pub max_ts: Timestamp,
    pub bucket: BucketId,
}

/// Ordered `(min_ts, max_ts)` index over a device's buckets, mapping each key
/// to the bucket's arena slot.
#[derive(Debug, Default, Clone)]
pub struct RangeIndex {
    entries: BTreeMap<RangeKey, usize>,
}

impl RangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: RangeKey, slot: usize) {
        self.entries.insert(key, slot);
    }

    /// Re-keys a bucket whose span widened. A no-op when the span is unchanged.
    pub fn rekey(&mut self, old: RangeKey, new: RangeKey) {
        if old == new {
            return;
        }
        if let Some(slot) = self.entries.remove(&old) {
            self.entries.insert(new, slot);
        }
    }

    /// Slots of the buckets overlapping `[lo, hi]`, in ascending `min_ts` order.
    ///
    /// One ascending scan over keys with `min_ts <= hi`, keeping those with
    /// `max_ts >= lo`.
    pub fn overlapping(&self, lo: Timestamp, hi: Timestamp) -> Vec<usize> {
        let upper = RangeKey { min_ts: hi, max_ts: MAX_TIMESTAMP, bucket: BucketId(u64::MAX) };
        self.entries
            .range((Bound::Unbounded, Bound::Included(upper)))
            .filter(|(key, _)| key.max_ts >= lo)
            .map(|(_, slot)| *slot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
