use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{Sample, Timestamp};
use crate::error::{Error, Result};

/// Store-wide bucket identifier, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketId(pub u64);

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket-{}", self.0)
    }
}

/// A sample as held inside a bucket, tagged with its per-device arrival
/// sequence so equal timestamps keep insertion order on the read path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSample {
    pub seq: u64,
    pub sample: Sample,
}

/// Container of up to `capacity` samples for one device.
///
/// Samples are kept in arrival order. `min_ts`/`max_ts` track the smallest and
/// largest sample timestamp, not the bucket creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: BucketId,
    pub device_id: String,
    pub count: usize,
    pub min_ts: Timestamp,
    pub max_ts: Timestamp,
    pub samples: Vec<StoredSample>,
}

impl Bucket {
    /// Upsert shape: a fresh bucket already holding its first sample.
    pub(crate) fn with_first_sample(id: BucketId, sample: Sample, seq: u64) -> Self {
        Self {
            id,
            device_id: sample.device_id.clone(),
            count: 1,
            min_ts: sample.timestamp,
            max_ts: sample.timestamp,
            samples: vec![StoredSample { seq, sample }],
        }
    }

    /// Push the sample, bump the count and widen the span.
    pub(crate) fn push(&mut self, sample: Sample, seq: u64) {
        self.min_ts = self.min_ts.min(sample.timestamp);
        self.max_ts = self.max_ts.max(sample.timestamp);
        self.count += 1;
        self.samples.push(StoredSample { seq, sample });
    }

    pub fn is_open(&self, capacity: usize) -> bool {
        self.count < capacity
    }

    /// Interval overlap predicate: `max_ts >= lo && min_ts <= hi`.
    pub fn overlaps(&self, lo: Timestamp, hi: Timestamp) -> bool {
        self.max_ts >= lo && self.min_ts <= hi
    }

    /// Samples in arrival order.
    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().map(|stored| &stored.sample)
    }

    /// Checks the bucket envelope invariants.
    pub fn check_envelope(&self) -> Result<()> {
        if self.count != self.samples.len() {
            return Err(Error::InvalidSample(format!(
                "{} has count {} but holds {} samples",
                self.id,
                self.count,
                self.samples.len()
            )));
        }
        if self.count == 0 {
            return Err(Error::InvalidSample(format!("{} is empty", self.id)));
        }
        for stored in &self.samples {
            let sample = &stored.sample;
            if sample.timestamp < self.min_ts || sample.timestamp > self.max_ts {
                return Err(Error::InvalidSample(format!(
                    "{} span [{}, {}] does not cover sample timestamp {}",
                    self.id, self.min_ts, self.max_ts, sample.timestamp
                )));
            }
            if sample.device_id != self.device_id {
                return Err(Error::InvalidSample(format!(
                    "{} belongs to '{}' but holds a sample for '{}'",
                    self.id, self.device_id, sample.device_id
                )));
            }
        }
        Ok(())
    }

    pub fn to_document(&self) -> Value {
        json!({
            "_id": self.id.0,
            "device_id": self.device_id,
            "count": self.count,
            "min_ts": self.min_ts,
            "max_ts": self.max_ts,
            "samples": self.samples().map(Sample::to_document).collect::<Vec<_>>(),
        })
    }

    /// Parses a bucket document, validating only the envelope. Samples get
    /// sequence numbers from their position in the document.
    pub fn from_document(document: &Value) -> Result<Self> {
        let field = |name: &str| {
            document.get(name).and_then(Value::as_u64).ok_or_else(|| {
                Error::InvalidSample(format!("bucket document field '{}' is missing", name))
            })
        };

        let id = BucketId(field("_id")?);
        let count = usize::try_from(field("count")?)
            .map_err(|e| Error::InvalidSample(format!("bucket count out of range: {}", e)))?;
        let min_ts = field("min_ts")?;
        let max_ts = field("max_ts")?;
        let device_id = document
            .get("device_id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidSample("bucket document has no device_id".into()))?
            .to_string();

        let samples = document
            .get("samples")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidSample("bucket document has no samples array".into()))?
            .iter()
            .enumerate()
            .map(|(seq, doc)| {
                Sample::from_document(doc).map(|sample| StoredSample { seq: seq as u64, sample })
            })
            .collect::<Result<Vec<_>>>()?;

        let bucket = Bucket { id, device_id, count, min_ts, max_ts, samples };
        bucket.check_envelope()?;
        Ok(bucket)
    }
}

/// Handle returned by an append: which bucket took the sample and its state
/// right after the mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    pub bucket_id: BucketId,
    pub device_id: String,
    pub count: usize,
    pub min_ts: Timestamp,
    pub max_ts: Timestamp,
    /// The append upserted a new bucket.
    pub created: bool,
    /// The append filled the bucket to capacity.
    pub closed: bool,
}

impl BucketRef {
    pub(crate) fn from_bucket(bucket: &Bucket, created: bool, capacity: usize) -> Self {
        Self {
            bucket_id: bucket.id,
            device_id: bucket.device_id.clone(),
            count: bucket.count,
            min_ts: bucket.min_ts,
            max_ts: bucket.max_ts,
            created,
            closed: !bucket.is_open(capacity),
        }
    }
}
