//! Integration tests for tsbucket
//!
//! These tests check the error taxonomy callers rely on to decide what to do
//! with a failure.

use tsbucket::{BucketConfig, BucketStore, Error, MemoryBucketStore, RangeQueryEngine, Result, Sample};

use std::sync::Arc;

#[test]
fn test_error_types() {
    let unavailable = Error::StoreUnavailable {
        operation: "atomic_append",
        device_id: Some("pump-7".to_string()),
        reason: "timeout".to_string(),
    };
    assert!(format!("{}", unavailable).contains("Store unavailable"));
    assert!(format!("{}", unavailable).contains("pump-7"));

    let capacity = Error::CapacityMisconfigured { capacity: -1 };
    assert!(format!("{}", capacity).contains("Capacity misconfigured"));

    let range = Error::InvalidRange { lo: 9, hi: 1 };
    assert!(format!("{}", range).contains("Invalid range"));

    let sample = Error::InvalidSample("no timestamp".to_string());
    assert!(format!("{}", sample).contains("Invalid sample"));
}

#[test]
fn test_result_type() {
    fn returns_ok() -> Result<usize> {
        Ok(42)
    }

    fn returns_err() -> Result<usize> {
        Err(Error::InvalidRange { lo: 2, hi: 1 })
    }

    assert!(returns_ok().is_ok());
    assert!(returns_err().is_err());
}

#[test]
fn test_reads_retryable_writes_rejected_after_shutdown() {
    let store = Arc::new(MemoryBucketStore::open(BucketConfig::default()).unwrap());
    store.atomic_append("d", Sample::new("d", 1)).unwrap();
    store.shutdown().unwrap();

    let engine = RangeQueryEngine::new(Arc::clone(&store));
    let read_err = engine.query_range("d", 0, 10).unwrap_err();
    assert!(read_err.is_retryable_read());

    // Range validation happens before the store is touched.
    assert!(matches!(engine.query_range("d", 10, 0), Err(Error::InvalidRange { .. })));

    let write_err = store.atomic_append("d", Sample::new("d", 2)).unwrap_err();
    assert!(matches!(write_err, Error::StoreUnavailable { device_id: Some(ref id), .. } if id == "d"));
    assert!(matches!(store.stats(), Err(Error::StoreUnavailable { .. })));
}
