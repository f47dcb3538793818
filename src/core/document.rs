//! Conversion between samples and generic JSON documents.
//!
//! A sample document has the shape
//!
//! ```json
//! { "timestamp": 1700000000000, "device_id": "pump-7",
//!   "metrics": { "rpm": 1200, "temperature": 48.5, "status": "ok" },
//!   "fields": { "location": { "site": "north", "rack": 3 } } }
//! ```
//!
//! `metrics` values must be numbers or strings. `fields` is optional and may
//! hold any nested JSON.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::core::{FieldValue, MetricValue, Sample};
use crate::error::{Error, Result};

impl MetricValue {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(MetricValue::Int).or_else(|| n.as_f64().map(MetricValue::Float)),
            Value::String(s) => Some(MetricValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Int(v) => json!(v),
            MetricValue::Float(v) => json!(v),
            MetricValue::Text(v) => json!(v),
        }
    }
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            Value::Object(map) => FieldValue::Map(
                map.iter().map(|(k, v)| (k.clone(), FieldValue::from_json(v))).collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => json!(b),
            FieldValue::Int(i) => json!(i),
            FieldValue::Float(f) => json!(f),
            FieldValue::Text(s) => json!(s),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::Map(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

impl Sample {
    /// Parses a sample document. Missing `timestamp` or `device_id` is an
    /// `InvalidSample` error, as is a metric that is neither number nor string.
    pub fn from_document(document: &Value) -> Result<Self> {
        let object = document
            .as_object()
            .ok_or_else(|| Error::InvalidSample("sample document must be an object".into()))?;

        let timestamp = match object.get("timestamp") {
            None | Some(Value::Null) => {
                return Err(Error::InvalidSample("sample document has no timestamp".into()))
            }
            Some(value) => value.as_u64().ok_or_else(|| {
                Error::InvalidSample(format!("timestamp {} is not a non-negative integer", value))
            })?,
        };

        let device_id = match object.get("device_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::String(_)) => {
                return Err(Error::InvalidSample("sample document has an empty device_id".into()))
            }
            Some(other) => {
                return Err(Error::InvalidSample(format!("device_id {} is not a string", other)))
            }
            None => return Err(Error::InvalidSample("sample document has no device_id".into())),
        };

        let mut metrics = BTreeMap::new();
        if let Some(raw) = object.get("metrics") {
            let raw = raw
                .as_object()
                .ok_or_else(|| Error::InvalidSample("metrics must be an object".into()))?;
            for (name, value) in raw {
                let metric = MetricValue::from_json(value).ok_or_else(|| {
                    Error::InvalidSample(format!("metric '{}' must be a number or a string", name))
                })?;
                metrics.insert(name.clone(), metric);
            }
        }

        let fields = match object.get("fields") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(raw)) => {
                raw.iter().map(|(k, v)| (k.clone(), FieldValue::from_json(v))).collect()
            }
            Some(_) => return Err(Error::InvalidSample("fields must be an object".into())),
        };

        Ok(Sample { timestamp, device_id, metrics, fields })
    }

    pub fn to_document(&self) -> Value {
        let metrics: Map<String, Value> =
            self.metrics.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();

        let mut document = json!({
            "timestamp": self.timestamp,
            "device_id": self.device_id,
            "metrics": metrics,
        });

        if !self.fields.is_empty() {
            let fields: Map<String, Value> =
                self.fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
            document["fields"] = Value::Object(fields);
        }
        document
    }
}
