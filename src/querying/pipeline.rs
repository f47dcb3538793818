//! Read-path stages.
//!
//! A range query runs as a plain sequence of transforms:
//!
//! 1. index scan: candidate buckets from the store, ascending by `min_ts`
//! 2. unwind: flatten each bucket's samples
//! 3. match: keep samples inside `[lo, hi]`
//! 4. sort: by timestamp, ties by arrival sequence
//! 5. project: emit owned [`Sample`]s tagged with their device

use std::sync::Arc;

use crate::core::{Sample, Timestamp};
use crate::storage::{Bucket, StoredSample};

/// Flattens candidate buckets into their stored samples, bucket by bucket.
pub fn unwind(buckets: &[Arc<Bucket>]) -> impl Iterator<Item = &StoredSample> {
    buckets.iter().flat_map(|bucket| bucket.samples.iter())
}

/// Inclusive timestamp filter. Buckets at the edge of the interval carry
/// samples outside it.
#[derive(Debug, Clone, Copy)]
pub struct MatchRange {
    pub lo: Timestamp,
    pub hi: Timestamp,
}

impl MatchRange {
    pub fn matches(&self, stored: &StoredSample) -> bool {
        (self.lo..=self.hi).contains(&stored.sample.timestamp)
    }
}

/// Flattening in `min_ts` order is not globally time-ordered when spans
/// overlap or samples arrived out of order, hence the explicit sort.
pub fn sort_by_timestamp(rows: &mut [&StoredSample]) {
    rows.sort_by_key(|stored| (stored.sample.timestamp, stored.seq));
}

pub fn project(rows: &[&StoredSample]) -> Vec<Sample> {
    rows.iter().map(|stored| stored.sample.clone()).collect()
}

/// Result of running the unwind, match, sort and project stages.
#[derive(Debug)]
pub struct PipelineOutput {
    pub samples: Vec<Sample>,
    pub scanned: usize,
}

pub fn run(buckets: &[Arc<Bucket>], lo: Timestamp, hi: Timestamp) -> PipelineOutput {
    let filter = MatchRange { lo, hi };
    let mut scanned = 0;
    let mut rows: Vec<&StoredSample> = unwind(buckets)
        .inspect(|_| scanned += 1)
        .filter(|stored| filter.matches(stored))
        .collect();
    sort_by_timestamp(&mut rows);
    PipelineOutput { samples: project(&rows), scanned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BucketId;

    fn bucket(id: u64, rows: &[(u64, Timestamp)]) -> Arc<Bucket> {
        let samples: Vec<StoredSample> = rows
            .iter()
            .map(|(seq, ts)| StoredSample { seq: *seq, sample: Sample::new("d", *ts) })
            .collect();
        let min_ts = rows.iter().map(|r| r.1).min().unwrap();
        let max_ts = rows.iter().map(|r| r.1).max().unwrap();
        Arc::new(Bucket {
            id: BucketId(id),
            device_id: "d".into(),
            count: samples.len(),
            min_ts,
            max_ts,
            samples,
        })
    }

    #[test]
    fn test_out_of_order_arrivals_are_sorted() {
        let buckets = vec![bucket(0, &[(0, 9), (1, 2), (2, 5)]), bucket(1, &[(3, 4), (4, 12)])];
        let out = run(&buckets, 0, 100);
        let ts: Vec<_> = out.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![2, 4, 5, 9, 12]);
        assert_eq!(out.scanned, 5);
    }

    #[test]
    fn test_edge_samples_are_filtered() {
        let buckets = vec![bucket(0, &[(0, 1), (1, 5)]), bucket(1, &[(2, 6), (3, 10)])];
        let out = run(&buckets, 5, 6);
        let ts: Vec<_> = out.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(ts, vec![5, 6]);
        assert_eq!(out.scanned, 4);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let buckets = vec![bucket(0, &[(0, 7), (2, 7)]), bucket(1, &[(1, 7)])];
        let mut rows: Vec<&StoredSample> = unwind(&buckets).collect();
        sort_by_timestamp(&mut rows);
        let seqs: Vec<_> = rows.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}
