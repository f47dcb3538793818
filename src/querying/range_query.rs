use std::sync::Arc;

use tracing::debug;

use crate::core::{Sample, Timestamp, MAX_TIMESTAMP, MIN_TIMESTAMP};
use crate::error::{Error, Result};
use crate::querying::pipeline;
use crate::storage::{BucketId, BucketStore};

/// A bucket selected by the overlap predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBucket {
    pub id: BucketId,
    pub min_ts: Timestamp,
    pub max_ts: Timestamp,
    pub count: usize,
}

/// What a range query did: which buckets it read and how much it filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub device_id: String,
    pub lo: Timestamp,
    pub hi: Timestamp,
    pub candidates: Vec<CandidateBucket>,
    pub used_range_index: bool,
    pub samples_scanned: usize,
    pub samples_returned: usize,
}

/// Answers interval queries by unioning and filtering a device's buckets.
pub struct RangeQueryEngine<S: BucketStore + ?Sized> {
    store: Arc<S>,
}

impl<S: BucketStore + ?Sized> RangeQueryEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Samples of `device_id` with `lo <= timestamp <= hi`, ascending by
    /// timestamp; equal timestamps come back in insertion order.
    ///
    /// # Errors
    ///
    /// - `InvalidRange` if `lo > hi`, checked before the store is touched
    /// - `StoreUnavailable` if the store cannot be reached (safe to retry)
    ///
    /// An unknown device yields an empty result.
    pub fn query_range(&self, device_id: &str, lo: Timestamp, hi: Timestamp) -> Result<Vec<Sample>> {
        self.execute(device_id, lo, hi).map(|(samples, _)| samples)
    }

    /// Every sample of the device.
    pub fn query_all(&self, device_id: &str) -> Result<Vec<Sample>> {
        self.query_range(device_id, MIN_TIMESTAMP, MAX_TIMESTAMP)
    }

    /// Runs the query and reports its plan instead of the samples.
    pub fn explain(&self, device_id: &str, lo: Timestamp, hi: Timestamp) -> Result<QueryPlan> {
        self.execute(device_id, lo, hi).map(|(_, plan)| plan)
    }

    fn execute(&self, device_id: &str, lo: Timestamp, hi: Timestamp) -> Result<(Vec<Sample>, QueryPlan)> {
        if lo > hi {
            return Err(Error::InvalidRange { lo, hi });
        }

        let scan = self.store.find_overlapping(device_id, lo, hi)?;
        let output = pipeline::run(&scan.buckets, lo, hi);

        let plan = QueryPlan {
            device_id: device_id.to_string(),
            lo,
            hi,
            candidates: scan
                .buckets
                .iter()
                .map(|bucket| CandidateBucket {
                    id: bucket.id,
                    min_ts: bucket.min_ts,
                    max_ts: bucket.max_ts,
                    count: bucket.count,
                })
                .collect(),
            used_range_index: scan.used_range_index,
            samples_scanned: output.scanned,
            samples_returned: output.samples.len(),
        };

        debug!(
            device_id,
            lo,
            hi,
            buckets = plan.candidates.len(),
            scanned = plan.samples_scanned,
            returned = plan.samples_returned,
            "range query"
        );
        Ok((output.samples, plan))
    }
}
