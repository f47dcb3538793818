#![allow(dead_code)]

use std::sync::Arc;

use tsbucket::{BucketConfig, BucketWriter, MemoryBucketStore, RangeQueryEngine, Sample};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn create_test_store(capacity: i64) -> Arc<MemoryBucketStore> {
    init_tracing();
    let config = BucketConfig { capacity, ..Default::default() };
    Arc::new(MemoryBucketStore::open(config).unwrap())
}

pub fn writer_and_engine(
    store: &Arc<MemoryBucketStore>,
) -> (BucketWriter<MemoryBucketStore>, RangeQueryEngine<MemoryBucketStore>) {
    (BucketWriter::new(Arc::clone(store)).unwrap(), RangeQueryEngine::new(Arc::clone(store)))
}

/// A reading with a temperature derived from the timestamp so samples are
/// distinguishable.
pub fn reading(device: &str, timestamp: u64) -> Sample {
    Sample::new(device, timestamp)
        .with_metric("temperature", 20.0 + (timestamp % 10) as f64 / 2.0)
        .with_metric("status", "ok")
}
