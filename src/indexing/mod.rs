//! Index definitions and the in-memory index structures behind them.
//!
//! Two indexes serve the two hot paths independently:
//!
//! - the **range index** `(device_id, min_ts, max_ts)` locates the buckets of a
//!   device that overlap a time interval
//! - the **open-bucket index** `(device_id, count)`, filtered to
//!   `count < capacity`, lets the writer find the one bucket still accepting
//!   samples without scanning closed buckets

use std::fmt;

pub mod manager;
pub mod open_bucket;
pub mod range;

pub use manager::IndexManager;
pub use open_bucket::OpenBucketIndex;
pub use range::RangeIndex;

/// Bucket document fields an index key may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexField {
    DeviceId,
    MinTs,
    MaxTs,
    Count,
}

impl fmt::Display for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexField::DeviceId => "device_id",
            IndexField::MinTs => "min_ts",
            IndexField::MaxTs => "max_ts",
            IndexField::Count => "count",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Partial-index filter predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFilter {
    /// Only buckets with `count < capacity`.
    CountBelow(usize),
}

/// Mirrors `createIndex(keys, filter?)` of a document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub keys: Vec<(IndexField, Direction)>,
    pub partial_filter: Option<IndexFilter>,
}

/// The index shapes the bucket store knows how to maintain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    Range,
    OpenBucket,
}

impl IndexDefinition {
    pub const RANGE_INDEX_NAME: &'static str = "device_id_1_min_ts_1_max_ts_1";
    pub const OPEN_BUCKET_INDEX_NAME: &'static str = "device_id_1_count_1_open";

    pub fn range() -> Self {
        Self {
            name: Self::RANGE_INDEX_NAME.to_string(),
            keys: vec![
                (IndexField::DeviceId, Direction::Ascending),
                (IndexField::MinTs, Direction::Ascending),
                (IndexField::MaxTs, Direction::Ascending),
            ],
            partial_filter: None,
        }
    }

    pub fn open_bucket(capacity: usize) -> Self {
        Self {
            name: Self::OPEN_BUCKET_INDEX_NAME.to_string(),
            keys: vec![
                (IndexField::DeviceId, Direction::Ascending),
                (IndexField::Count, Direction::Ascending),
            ],
            partial_filter: Some(IndexFilter::CountBelow(capacity)),
        }
    }

    /// Classifies the definition, or `None` for a shape the store cannot serve.
    pub fn kind(&self, capacity: usize) -> Option<IndexKind> {
        let fields: Vec<IndexField> = self.keys.iter().map(|(field, _)| *field).collect();
        let ascending = self.keys.iter().all(|(_, dir)| *dir == Direction::Ascending);
        if !ascending {
            return None;
        }
        match (fields.as_slice(), self.partial_filter) {
            ([IndexField::DeviceId, IndexField::MinTs, IndexField::MaxTs], None) => {
                Some(IndexKind::Range)
            }
            ([IndexField::DeviceId, IndexField::Count], Some(IndexFilter::CountBelow(limit)))
                if limit == capacity =>
            {
                Some(IndexKind::OpenBucket)
            }
            _ => None,
        }
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .keys
            .iter()
            .map(|(field, dir)| {
                let sign = if *dir == Direction::Ascending { 1 } else { -1 };
                format!("{}: {}", field, sign)
            })
            .collect();
        write!(f, "{} {{ {} }}", self.name, keys.join(", "))?;
        if let Some(IndexFilter::CountBelow(limit)) = self.partial_filter {
            write!(f, " where count < {}", limit)?;
        }
        Ok(())
    }
}

/// Handle to a created index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexHandle {
    pub name: String,
    pub kind: IndexKind,
}
