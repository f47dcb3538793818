//! Core data structures and types for the tsbucket storage engine

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sample timestamp. The unit is chosen by the caller (typically milliseconds
/// since epoch); the engine only relies on ordering.
pub type Timestamp = u64;

/// Lowest representable timestamp, used as the open lower bound of a query.
pub const MIN_TIMESTAMP: Timestamp = Timestamp::MIN;

/// Highest representable timestamp, used as the open upper bound of a query.
pub const MAX_TIMESTAMP: Timestamp = Timestamp::MAX;

/// Value of a single named metric (temperature, rpm, status, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<i32> for MetricValue {
    fn from(value: i32) -> Self {
        MetricValue::Int(i64::from(value))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Optional nested structured field carried alongside the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// False when any float inside the value is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        match self {
            FieldValue::Float(f) => f.is_finite(),
            FieldValue::List(items) => items.iter().all(FieldValue::is_finite),
            FieldValue::Map(entries) => entries.values().all(FieldValue::is_finite),
            _ => true,
        }
    }
}

/// One sensor reading. Immutable once appended to a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub device_id: String,
    pub metrics: BTreeMap<String, MetricValue>,
    /// Nested structured fields; empty when the reading has none.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Sample {
    pub fn new(device_id: &str, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            device_id: device_id.to_string(),
            metrics: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metric(mut self, name: &str, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.get(name)
    }

    /// Checks the envelope a sample needs before it may touch the store.
    /// NaN and infinite floats are rejected, they have no JSON document form.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.is_empty() {
            return Err(Error::InvalidSample(format!(
                "sample at timestamp {} has an empty device id",
                self.timestamp
            )));
        }
        for (name, value) in &self.metrics {
            if let MetricValue::Float(f) = value {
                if !f.is_finite() {
                    return Err(Error::InvalidSample(format!("metric '{}' is not finite: {}", name, f)));
                }
            }
        }
        if let Some(name) = self.fields.iter().find(|(_, value)| !value.is_finite()).map(|(name, _)| name) {
            return Err(Error::InvalidSample(format!("field '{}' holds a non-finite float", name)));
        }
        Ok(())
    }
}

pub mod document;
