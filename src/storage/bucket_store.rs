use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::core::{Sample, Timestamp};
use crate::error::{Error, Result};
use crate::indexing::range::RangeKey;
use crate::indexing::{IndexDefinition, IndexHandle, IndexKind, IndexManager, OpenBucketIndex, RangeIndex};
use crate::storage::{Bucket, BucketConfig, BucketId, BucketRef, BucketScan, BucketStore, StoreStats};

fn range_key(bucket: &Bucket) -> RangeKey {
    RangeKey { min_ts: bucket.min_ts, max_ts: bucket.max_ts, bucket: bucket.id }
}

fn poisoned<'a, T>(operation: &'static str, device_id: Option<&'a str>) -> impl FnOnce(PoisonError<T>) -> Error + 'a {
    move |_| Error::unavailable(operation, device_id, "lock poisoned by a panicked writer")
}

/// Everything the store holds for one device: an append-only arena of buckets
/// plus the device's slice of both indexes.
#[derive(Debug)]
struct DeviceShard {
    buckets: Vec<Arc<Bucket>>,
    next_seq: u64,
    range_index: Option<RangeIndex>,
    open_index: Option<OpenBucketIndex>,
}

impl DeviceShard {
    fn new(kinds: &[IndexKind], capacity: usize) -> Self {
        let mut shard = Self { buckets: Vec::new(), next_seq: 0, range_index: None, open_index: None };
        for kind in kinds {
            shard.build_index(*kind, capacity);
        }
        shard
    }

    fn build_index(&mut self, kind: IndexKind, capacity: usize) {
        match kind {
            IndexKind::Range => {
                let mut index = RangeIndex::new();
                for (slot, bucket) in self.buckets.iter().enumerate() {
                    index.insert(range_key(bucket), slot);
                }
                self.range_index = Some(index);
            }
            IndexKind::OpenBucket => {
                let mut index = OpenBucketIndex::new(capacity);
                if let Some(slot) = self.scan_open_slot(capacity) {
                    let bucket = &self.buckets[slot];
                    index.record(bucket.id, slot, bucket.count);
                }
                self.open_index = Some(index);
            }
        }
    }

    fn scan_open_slot(&self, capacity: usize) -> Option<usize> {
        self.buckets.iter().rposition(|bucket| bucket.is_open(capacity))
    }

    fn open_slot(&self, capacity: usize) -> Option<usize> {
        match &self.open_index {
            Some(index) => index.lookup().map(|entry| entry.slot),
            None => self.scan_open_slot(capacity),
        }
    }

    /// Match-and-mutate, or upsert when nothing matches. The caller holds the
    /// shard's write lock for the whole call.
    fn append(
        &mut self,
        sample: Sample,
        capacity: usize,
        next_id: impl FnOnce() -> BucketId,
    ) -> BucketRef {
        let seq = self.next_seq;
        self.next_seq += 1;

        let (slot, created) = match self.open_slot(capacity) {
            Some(slot) => {
                // Copy-on-write: readers holding the previous Arc keep a whole,
                // unchanged bucket.
                let bucket = Arc::make_mut(&mut self.buckets[slot]);
                let old_key = range_key(bucket);
                bucket.push(sample, seq);
                if let Some(index) = &mut self.range_index {
                    index.rekey(old_key, range_key(bucket));
                }
                (slot, false)
            }
            None => {
                let bucket = Bucket::with_first_sample(next_id(), sample, seq);
                let slot = self.buckets.len();
                if let Some(index) = &mut self.range_index {
                    index.insert(range_key(&bucket), slot);
                }
                self.buckets.push(Arc::new(bucket));
                (slot, true)
            }
        };

        let bucket = &self.buckets[slot];
        if let Some(index) = &mut self.open_index {
            index.record(bucket.id, slot, bucket.count);
        }
        BucketRef::from_bucket(bucket, created, capacity)
    }

    fn overlapping(&self, lo: Timestamp, hi: Timestamp) -> BucketScan {
        match &self.range_index {
            Some(index) => BucketScan {
                buckets: index
                    .overlapping(lo, hi)
                    .into_iter()
                    .map(|slot| Arc::clone(&self.buckets[slot]))
                    .collect(),
                used_range_index: true,
            },
            None => {
                let mut buckets: Vec<Arc<Bucket>> = self
                    .buckets
                    .iter()
                    .filter(|bucket| bucket.overlaps(lo, hi))
                    .cloned()
                    .collect();
                buckets.sort_by_key(|bucket| (bucket.min_ts, bucket.max_ts, bucket.id));
                BucketScan { buckets, used_range_index: false }
            }
        }
    }
}

/// Embedded bucket store.
///
/// Each device has its own shard lock, so writers to different devices never
/// contend. Writers to the same device serialize on that lock, which makes
/// find-open-bucket, upsert and append one atomic step. Readers clone `Arc`s to
/// the candidate buckets under a short read lock and do the rest unlocked.
pub struct MemoryBucketStore {
    shards: RwLock<HashMap<String, Arc<RwLock<DeviceShard>>>>,
    indexes: RwLock<Vec<IndexHandle>>,
    next_bucket_id: AtomicU64,
    available: AtomicBool,
    shutdown_lock: Mutex<()>,
    capacity: usize,
    config: BucketConfig,
}

impl MemoryBucketStore {
    /// Opens a store. Loads `config.snapshot_path` when the file exists, then
    /// creates the indexes if `config.create_indexes_on_open` is set.
    pub fn open(config: BucketConfig) -> Result<Self> {
        let store = Self::empty(config)?;

        if let Some(path) = store.config.snapshot_path.clone() {
            if path.exists() {
                store.load_snapshot_file(&path)?;
            }
        }

        store.finish_open()?;
        Ok(store)
    }

    pub(crate) fn empty(config: BucketConfig) -> Result<Self> {
        let capacity = config.validate()?;
        Ok(Self {
            shards: RwLock::new(HashMap::new()),
            indexes: RwLock::new(Vec::new()),
            next_bucket_id: AtomicU64::new(0),
            available: AtomicBool::new(true),
            shutdown_lock: Mutex::new(()),
            capacity,
            config,
        })
    }

    pub(crate) fn finish_open(&self) -> Result<()> {
        if self.config.create_indexes_on_open {
            IndexManager::create_indexes(self)?;
        } else {
            warn!(
                capacity = self.capacity,
                "bucket store opened without indexes; appends and range queries will scan"
            );
        }
        Ok(())
    }

    pub fn config(&self) -> &BucketConfig {
        &self.config
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Handles of the indexes created so far.
    pub fn indexes(&self) -> Result<Vec<IndexHandle>> {
        let indexes = self.indexes.read().map_err(poisoned("indexes", None))?;
        Ok(indexes.clone())
    }

    /// Marks the store unavailable and writes the final snapshot when a
    /// snapshot path is configured. Every later call fails with
    /// `StoreUnavailable`.
    ///
    /// If the final snapshot cannot be written the store is made available
    /// again and the error is returned, so `shutdown` can be retried.
    pub fn shutdown(&self) -> Result<()> {
        let _guard = self.shutdown_lock.lock().map_err(poisoned("shutdown", None))?;
        if !self.available.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(path) = &self.config.snapshot_path {
            if let Err(err) = self.write_snapshot_file(path) {
                self.available.store(true, Ordering::SeqCst);
                warn!(path = %path.display(), error = %err, "final snapshot failed, store left open");
                return Err(err);
            }
        }

        info!("bucket store shut down");
        Ok(())
    }

    fn ensure_available(&self, operation: &'static str, device_id: Option<&str>) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::unavailable(operation, device_id, "store is shut down"))
        }
    }

    fn index_kinds(&self) -> Result<Vec<IndexKind>> {
        let indexes = self.indexes.read().map_err(poisoned("index_kinds", None))?;
        Ok(indexes.iter().map(|handle| handle.kind).collect())
    }

    fn has_index(&self, kind: IndexKind) -> Result<bool> {
        Ok(self.index_kinds()?.contains(&kind))
    }

    fn shard(&self, device_id: &str) -> Result<Option<Arc<RwLock<DeviceShard>>>> {
        let shards = self.shards.read().map_err(poisoned("shard_lookup", Some(device_id)))?;
        Ok(shards.get(device_id).cloned())
    }

    fn shard_or_insert(&self, device_id: &str) -> Result<Arc<RwLock<DeviceShard>>> {
        if let Some(shard) = self.shard(device_id)? {
            return Ok(shard);
        }

        let mut shards = self.shards.write().map_err(poisoned("shard_insert", Some(device_id)))?;
        let kinds = self.index_kinds()?;
        let capacity = self.capacity;
        let shard = shards
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(DeviceShard::new(&kinds, capacity))));
        Ok(Arc::clone(shard))
    }

    pub(crate) fn export_buckets(&self) -> Result<Vec<Bucket>> {
        let shards = self.shards.read().map_err(poisoned("export", None))?;
        let mut buckets = Vec::new();
        for (device_id, shard) in shards.iter() {
            let shard = shard.read().map_err(poisoned("export", Some(device_id.as_str())))?;
            buckets.extend(shard.buckets.iter().map(|bucket| Bucket::clone(bucket)));
        }
        buckets.sort_by_key(|bucket| bucket.id);
        Ok(buckets)
    }

    /// Rebuilds the device shards from restored buckets. Must run before any
    /// index is created.
    pub(crate) fn restore(&self, mut buckets: Vec<Bucket>) -> Result<()> {
        buckets.sort_by_key(|bucket| bucket.id);

        let mut shards = self.shards.write().map_err(poisoned("restore", None))?;
        let mut next_id = 0;
        for bucket in buckets {
            bucket.check_envelope()?;
            if bucket.count > self.capacity {
                return Err(Error::Config(format!(
                    "{} holds {} samples but the store capacity is {}",
                    bucket.id, bucket.count, self.capacity
                )));
            }

            next_id = next_id.max(bucket.id.0 + 1);
            let shard = shards
                .entry(bucket.device_id.clone())
                .or_insert_with(|| Arc::new(RwLock::new(DeviceShard::new(&[], self.capacity))));
            let mut shard = shard.write().map_err(poisoned("restore", Some(bucket.device_id.as_str())))?;
            let last_seq = bucket.samples.iter().map(|stored| stored.seq).max().unwrap_or(0);
            shard.next_seq = shard.next_seq.max(last_seq + 1);
            shard.buckets.push(Arc::new(bucket));
        }

        self.next_bucket_id.store(next_id, Ordering::SeqCst);
        Ok(())
    }
}

impl BucketStore for MemoryBucketStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn atomic_append(&self, device_id: &str, sample: Sample) -> Result<BucketRef> {
        const OP: &str = "atomic_append";
        self.ensure_available(OP, Some(device_id))?;
        sample.validate()?;
        if sample.device_id != device_id {
            return Err(Error::InvalidSample(format!(
                "sample for '{}' cannot be appended to device '{}'",
                sample.device_id, device_id
            )));
        }

        let shard = self.shard_or_insert(device_id)?;
        let mut shard = shard.write().map_err(poisoned(OP, Some(device_id)))?;
        // Re-checked under the shard lock so shutdown never races a half-done append.
        self.ensure_available(OP, Some(device_id))?;

        let bucket_ref = shard.append(sample, self.capacity, || {
            BucketId(self.next_bucket_id.fetch_add(1, Ordering::SeqCst))
        });

        if bucket_ref.created {
            debug!(device_id, bucket = %bucket_ref.bucket_id, "opened new bucket");
        }
        if bucket_ref.closed {
            debug!(device_id, bucket = %bucket_ref.bucket_id, count = bucket_ref.count, "bucket closed");
        }
        Ok(bucket_ref)
    }

    fn create_index(&self, definition: IndexDefinition) -> Result<IndexHandle> {
        const OP: &str = "create_index";
        self.ensure_available(OP, None)?;

        let kind = definition.kind(self.capacity).ok_or_else(|| {
            Error::Config(format!("unsupported index definition: {}", definition))
        })?;

        // Shards map first, then the index list: the same order as shard_or_insert.
        let shards = self.shards.write().map_err(poisoned(OP, None))?;
        let mut indexes = self.indexes.write().map_err(poisoned(OP, None))?;

        if let Some(existing) = indexes.iter().find(|handle| handle.kind == kind) {
            return Ok(existing.clone());
        }

        for (device_id, shard) in shards.iter() {
            let mut shard = shard.write().map_err(poisoned(OP, Some(device_id.as_str())))?;
            shard.build_index(kind, self.capacity);
        }

        let handle = IndexHandle { name: definition.name.clone(), kind };
        indexes.push(handle.clone());
        info!(index = %definition, devices = shards.len(), "index created");
        Ok(handle)
    }

    fn find_overlapping(&self, device_id: &str, lo: Timestamp, hi: Timestamp) -> Result<BucketScan> {
        const OP: &str = "find_overlapping";
        if lo > hi {
            return Err(Error::InvalidRange { lo, hi });
        }
        self.ensure_available(OP, Some(device_id))?;

        let Some(shard) = self.shard(device_id)? else {
            return Ok(BucketScan { buckets: Vec::new(), used_range_index: self.has_index(IndexKind::Range)? });
        };
        let shard = shard.read().map_err(poisoned(OP, Some(device_id)))?;
        let scan = shard.overlapping(lo, hi);
        if !scan.used_range_index {
            debug!(device_id, buckets = shard.buckets.len(), "range index missing, scanned all buckets");
        }
        Ok(scan)
    }

    fn device_buckets(&self, device_id: &str) -> Result<Vec<Arc<Bucket>>> {
        const OP: &str = "device_buckets";
        self.ensure_available(OP, Some(device_id))?;

        match self.shard(device_id)? {
            Some(shard) => {
                let shard = shard.read().map_err(poisoned(OP, Some(device_id)))?;
                Ok(shard.buckets.clone())
            }
            None => Ok(Vec::new()),
        }
    }

    fn stats(&self) -> Result<StoreStats> {
        const OP: &str = "stats";
        self.ensure_available(OP, None)?;

        let shards = self.shards.read().map_err(poisoned(OP, None))?;
        let mut stats = StoreStats::new(self.capacity);
        for (device_id, shard) in shards.iter() {
            let shard = shard.read().map_err(poisoned(OP, Some(device_id.as_str())))?;
            if shard.buckets.is_empty() {
                continue;
            }
            stats.devices += 1;
            for bucket in &shard.buckets {
                stats.record_bucket(bucket);
            }
            stats.range_index_entries += shard.range_index.as_ref().map_or(0, RangeIndex::len);
            stats.open_index_entries += shard.open_index.as_ref().map_or(0, OpenBucketIndex::len);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: i64, with_indexes: bool) -> MemoryBucketStore {
        let config = BucketConfig { capacity, create_indexes_on_open: with_indexes, ..Default::default() };
        MemoryBucketStore::open(config).unwrap()
    }

    fn append_all(store: &MemoryBucketStore, device: &str, timestamps: impl IntoIterator<Item = u64>) {
        for ts in timestamps {
            store.atomic_append(device, Sample::new(device, ts)).unwrap();
        }
    }

    #[test]
    fn test_first_append_upserts_bucket() {
        let store = store(3, true);
        let bucket_ref = store.atomic_append("d", Sample::new("d", 42)).unwrap();
        assert!(bucket_ref.created);
        assert!(!bucket_ref.closed);
        assert_eq!((bucket_ref.count, bucket_ref.min_ts, bucket_ref.max_ts), (1, 42, 42));
    }

    #[test]
    fn test_bucket_closes_at_capacity_and_next_append_opens_new_one() {
        let store = store(2, true);
        let first = store.atomic_append("d", Sample::new("d", 1)).unwrap();
        let second = store.atomic_append("d", Sample::new("d", 2)).unwrap();
        let third = store.atomic_append("d", Sample::new("d", 3)).unwrap();

        assert_eq!(first.bucket_id, second.bucket_id);
        assert!(second.closed);
        assert!(third.created);
        assert_ne!(third.bucket_id, second.bucket_id);

        let stats = store.stats().unwrap();
        assert_eq!((stats.buckets, stats.open_buckets, stats.closed_buckets), (2, 1, 1));
        assert_eq!(stats.open_index_entries, 1);
    }

    #[test]
    fn test_capacity_one_never_leaves_open_bucket() {
        let store = store(1, true);
        append_all(&store, "d", 0..4);
        let stats = store.stats().unwrap();
        assert_eq!(stats.buckets, 4);
        assert_eq!(stats.open_buckets, 0);
        assert_eq!(stats.open_index_entries, 0);
    }

    #[test]
    fn test_scan_and_index_paths_agree() {
        let indexed = store(4, true);
        let scanned = store(4, false);
        let timestamps = [5, 3, 9, 1, 20, 18, 30, 2, 40, 41];
        append_all(&indexed, "d", timestamps);
        append_all(&scanned, "d", timestamps);

        let a = indexed.find_overlapping("d", 4, 19).unwrap();
        let b = scanned.find_overlapping("d", 4, 19).unwrap();
        assert!(a.used_range_index);
        assert!(!b.used_range_index);

        let ids = |scan: &BucketScan| scan.buckets.iter().map(|b| b.id).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn test_indexes_created_after_writes_cover_existing_buckets() {
        let store = store(3, false);
        append_all(&store, "d", 1..=7);
        IndexManager::create_indexes(&store).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.range_index_entries, 3);
        assert_eq!(stats.open_index_entries, 1);

        let next = store.atomic_append("d", Sample::new("d", 8)).unwrap();
        assert!(!next.created);
        assert_eq!(next.count, 2);
    }

    #[test]
    fn test_reader_snapshot_is_not_mutated_by_later_append() {
        let store = store(4, true);
        append_all(&store, "d", [1, 2]);
        let before = store.find_overlapping("d", 0, 100).unwrap();
        append_all(&store, "d", [3]);

        assert_eq!(before.buckets[0].count, 2);
        assert_eq!(store.device_buckets("d").unwrap()[0].count, 3);
    }

    #[test]
    fn test_unknown_device_and_inverted_range() {
        let store = store(4, true);
        assert!(store.find_overlapping("ghost", 0, 10).unwrap().buckets.is_empty());
        assert!(store.device_buckets("ghost").unwrap().is_empty());
        assert!(matches!(
            store.find_overlapping("ghost", 10, 0),
            Err(Error::InvalidRange { lo: 10, hi: 0 })
        ));
    }

    #[test]
    fn test_shutdown_makes_store_unavailable() {
        let store = store(4, true);
        append_all(&store, "d", [1]);
        store.shutdown().unwrap();
        store.shutdown().unwrap();

        let err = store.atomic_append("d", Sample::new("d", 2)).unwrap_err();
        match err {
            Error::StoreUnavailable { operation, device_id, .. } => {
                assert_eq!(operation, "atomic_append");
                assert_eq!(device_id.as_deref(), Some("d"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.find_overlapping("d", 0, 5).unwrap_err().is_retryable_read());
    }

    #[test]
    fn test_append_rejects_sample_for_other_device() {
        let store = store(4, true);
        let err = store.atomic_append("a", Sample::new("b", 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidSample(_)));
        assert!(matches!(store.atomic_append("", Sample::new("", 1)), Err(Error::InvalidSample(_))));

        let first = store.atomic_append("a", Sample::new("a", 2)).unwrap();
        assert!(first.created);
        assert_eq!(first.device_id, "a");
        let buckets = store.device_buckets("a").unwrap();
        assert_eq!(buckets.len(), 1);
        assert!(buckets[0].samples().all(|s| s.device_id == "a"));
        assert!(store.device_buckets("b").unwrap().is_empty());
    }

    #[test]
    fn test_poisoned_index_lock_is_store_unavailable() {
        let store = store(4, false);
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _indexes = store.indexes.write().unwrap();
            panic!("writer died holding the index list");
        }));

        assert!(matches!(store.indexes(), Err(Error::StoreUnavailable { operation: "indexes", .. })));
        assert!(matches!(
            store.find_overlapping("ghost", 0, 10),
            Err(Error::StoreUnavailable { .. })
        ));
    }

    #[test]
    fn test_unsupported_index_is_rejected() {
        let store = store(4, false);
        let definition = IndexDefinition::open_bucket(99);
        assert!(matches!(store.create_index(definition), Err(Error::Config(_))));
    }
}
