//! # tsbucket
//!
//! tsbucket is a bucketed time-series storage engine. Consecutive samples from
//! a device are grouped into capacity-bounded bucket documents, which cuts the
//! per-sample storage overhead, the index footprint and the I/O needed to read
//! a time range back.
//!
//! ## Components
//!
//! - [`storage`] owns the bucket documents and the atomic append primitive
//! - [`indexing`] maintains the range index and the open-bucket index
//! - [`execution`] holds the [`BucketWriter`] that routes samples into buckets
//! - [`querying`] answers interval queries by unioning and filtering buckets
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tsbucket::{BucketConfig, BucketWriter, MemoryBucketStore, RangeQueryEngine, Sample};
//!
//! fn example() -> tsbucket::Result<()> {
//!     let config = BucketConfig { capacity: 5, ..Default::default() };
//!     let store = Arc::new(MemoryBucketStore::open(config)?);
//!
//!     let writer = BucketWriter::new(Arc::clone(&store))?;
//!     for ts in 1..=12 {
//!         writer.write("pump-7", Sample::new("pump-7", ts).with_metric("rpm", 1200))?;
//!     }
//!
//!     let engine = RangeQueryEngine::new(store);
//!     let samples = engine.query_range("pump-7", 4, 9)?;
//!     assert_eq!(samples.len(), 6);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

/// Core data structures and types
pub mod core;

/// Bucket documents and the bucket store
pub mod storage;

/// Range and open-bucket indexes over the bucket store
pub mod indexing;

/// Write path: routing samples into buckets
pub mod execution;

/// Read path: interval queries across buckets
pub mod querying;

pub mod error {
    //! Error types and result definitions

    use thiserror::Error;

    use crate::core::Timestamp;

    /// Result type alias for tsbucket operations
    pub type Result<T> = std::result::Result<T, Error>;

    /// Main error type for tsbucket
    #[derive(Debug, Error)]
    pub enum Error {
        /// The bucket store could not be reached, has been shut down, or failed
        /// an I/O call. Only reads are safe to retry: a write may have been
        /// applied before the failure was reported.
        #[error("Store unavailable during {operation}{}: {reason}", device_suffix(.device_id))]
        StoreUnavailable {
            /// Store operation that failed
            operation: &'static str,
            /// Device the operation targeted, when there is one
            device_id: Option<String>,
            /// Underlying cause
            reason: String,
        },

        /// Bucket capacity must be strictly positive.
        #[error("Capacity misconfigured: {capacity} (must be > 0)")]
        CapacityMisconfigured {
            /// The rejected capacity
            capacity: i64,
        },

        /// Range query with `lo > hi`.
        #[error("Invalid range: lo {lo} is greater than hi {hi}")]
        InvalidRange {
            /// Lower bound
            lo: Timestamp,
            /// Upper bound
            hi: Timestamp,
        },

        /// Sample is missing a device id or timestamp, or targets another device.
        #[error("Invalid sample: {0}")]
        InvalidSample(String),

        /// Configuration could not be read or parsed
        #[error("Configuration error: {0}")]
        Config(String),
    }

    fn device_suffix(device_id: &Option<String>) -> String {
        match device_id {
            Some(id) => format!(" for device '{}'", id),
            None => String::new(),
        }
    }

    impl Error {
        pub(crate) fn unavailable(
            operation: &'static str,
            device_id: Option<&str>,
            reason: impl ToString,
        ) -> Self {
            Error::StoreUnavailable {
                operation,
                device_id: device_id.map(str::to_string),
                reason: reason.to_string(),
            }
        }

        /// True when a read that failed with this error may be retried.
        ///
        /// Writes are never retried blindly, whatever this returns.
        pub fn is_retryable_read(&self) -> bool {
            matches!(self, Error::StoreUnavailable { .. })
        }
    }
}

// Re-export commonly used types
pub use crate::core::{FieldValue, MetricValue, Sample, Timestamp};
pub use error::{Error, Result};
pub use execution::BucketWriter;
pub use indexing::{IndexDefinition, IndexHandle, IndexManager};
pub use querying::{QueryPlan, RangeQueryEngine};
pub use storage::{Bucket, BucketConfig, BucketId, BucketRef, BucketStore, MemoryBucketStore, StoreStats};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CapacityMisconfigured { capacity: 0 };
        assert_eq!(format!("{}", err), "Capacity misconfigured: 0 (must be > 0)");

        let err = Error::unavailable("atomic_append", Some("pump-7"), "store is shut down");
        assert_eq!(
            err.to_string(),
            "Store unavailable during atomic_append for device 'pump-7': store is shut down"
        );

        let err = Error::unavailable("stats", None, "lock poisoned");
        assert_eq!(err.to_string(), "Store unavailable during stats: lock poisoned");
    }

    #[test]
    fn test_only_store_errors_are_retryable() {
        assert!(Error::unavailable("find_overlapping", None, "timeout").is_retryable_read());
        assert!(!Error::InvalidRange { lo: 5, hi: 1 }.is_retryable_read());
        assert!(!Error::InvalidSample("empty device id".into()).is_retryable_read());
    }
}
