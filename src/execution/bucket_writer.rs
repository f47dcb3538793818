use std::sync::Arc;

use tracing::trace;

use crate::core::Sample;
use crate::error::{Error, Result};
use crate::storage::{BucketRef, BucketStore};

/// Appends samples to the bucket store.
///
/// Every successful `write` mutates exactly one bucket. Writes are not
/// idempotent: submitting the same sample twice stores it twice, so a write
/// that failed with `StoreUnavailable` must not be retried blindly.
pub struct BucketWriter<S: BucketStore + ?Sized> {
    store: Arc<S>,
}

impl<S: BucketStore + ?Sized> BucketWriter<S> {
    /// Creates a writer over `store`.
    ///
    /// # Errors
    ///
    /// Returns `CapacityMisconfigured` if the store reports a zero capacity.
    pub fn new(store: Arc<S>) -> Result<Self> {
        if store.capacity() == 0 {
            return Err(Error::CapacityMisconfigured { capacity: 0 });
        }
        Ok(Self { store })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Appends `sample` to the open bucket of `device_id`, creating one if needed.
    ///
    /// # Errors
    ///
    /// - `InvalidSample` if `device_id` is empty or differs from the sample's device
    /// - `StoreUnavailable` if the store cannot be reached
    pub fn write(&self, device_id: &str, sample: Sample) -> Result<BucketRef> {
        if device_id.is_empty() {
            return Err(Error::InvalidSample("device id must not be empty".into()));
        }
        sample.validate()?;
        if sample.device_id != device_id {
            return Err(Error::InvalidSample(format!(
                "sample belongs to device '{}' but was written to '{}'",
                sample.device_id, device_id
            )));
        }

        let timestamp = sample.timestamp;
        let bucket_ref = self.store.atomic_append(device_id, sample)?;
        trace!(device_id, timestamp, bucket = %bucket_ref.bucket_id, count = bucket_ref.count, "sample appended");
        Ok(bucket_ref)
    }

    /// Writes samples in order, stopping at the first error. Samples written
    /// before the error stay in the store.
    pub fn write_many<I>(&self, device_id: &str, samples: I) -> Result<Vec<BucketRef>>
    where
        I: IntoIterator<Item = Sample>,
    {
        samples.into_iter().map(|sample| self.write(device_id, sample)).collect()
    }
}

impl<S: BucketStore + ?Sized> Clone for BucketWriter<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BucketConfig, MemoryBucketStore};

    fn writer(capacity: i64) -> BucketWriter<MemoryBucketStore> {
        let config = BucketConfig { capacity, ..Default::default() };
        BucketWriter::new(Arc::new(MemoryBucketStore::open(config).unwrap())).unwrap()
    }

    #[test]
    fn test_rejects_mismatched_device() {
        let writer = writer(4);
        let err = writer.write("a", Sample::new("b", 1)).unwrap_err();
        assert!(matches!(err, Error::InvalidSample(_)));
        assert_eq!(writer.store().stats().unwrap().samples, 0);
    }

    #[test]
    fn test_rejects_empty_device() {
        let writer = writer(4);
        assert!(matches!(writer.write("", Sample::new("", 1)), Err(Error::InvalidSample(_))));
    }

    #[test]
    fn test_write_many_stops_at_first_error() {
        let writer = writer(4);
        let samples = vec![Sample::new("a", 1), Sample::new("a", 2), Sample::new("x", 3), Sample::new("a", 4)];
        assert!(writer.write_many("a", samples).is_err());
        assert_eq!(writer.store().stats().unwrap().samples, 2);
    }

    #[test]
    fn test_each_write_touches_one_bucket() {
        let writer = writer(3);
        let refs = writer.write_many("a", (1..=7).map(|ts| Sample::new("a", ts))).unwrap();
        let created: Vec<bool> = refs.iter().map(|r| r.created).collect();
        assert_eq!(created, vec![true, false, false, true, false, false, true]);
        let counts: Vec<usize> = refs.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![1, 2, 3, 1, 2, 3, 1]);
    }
}
