//! Flat event records sent to Honeycomb

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::span::Value;

pub const TRACE_ID: &str = "trace.trace_id";
pub const SPAN_ID: &str = "trace.span_id";
pub const PARENT_ID: &str = "trace.parent_id";
pub const LINK_TRACE_ID: &str = "trace.link.trace_id";
pub const LINK_SPAN_ID: &str = "trace.link.span_id";
pub const NAME: &str = "name";
pub const START_TIME: &str = "start_time";
pub const DURATION_MS: &str = "duration_ms";
pub const STATUS_CODE: &str = "response.status_code";
pub const STATUS_MESSAGE: &str = "status.message";
pub const SPAN_KIND: &str = "span.kind";
pub const ANNOTATION_TYPE: &str = "meta.annotation_type";
pub const REF_TYPE: &str = "ref_type";
pub const ERROR: &str = "error";
pub const SERVICE_NAME: &str = "service_name";
pub const EXPORTER_VERSION: &str = "meta.otel_exporter_version";
pub const LOCAL_HOSTNAME: &str = "meta.local_hostname";

/// Scalar value of an event field
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&Value> for FieldValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(v) => FieldValue::Bool(*v),
            Value::I64(v) => FieldValue::Int(*v),
            Value::F64(v) => FieldValue::Float(*v),
            Value::String(v) => FieldValue::String(v.clone()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

/// One flat record: a primary span, a link or a span event
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct Event {
    fields: BTreeMap<String, FieldValue>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing any previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Set a field only if the key is still free. Returns whether it was added.
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<FieldValue>) -> bool {
        if self.fields.contains_key(key) {
            return false;
        }
        self.fields.insert(key.to_string(), value.into());
        true
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Pull the `start_time` field out of the record
    pub fn take_start_time(&mut self) -> Option<DateTime<Utc>> {
        match self.fields.remove(START_TIME) {
            Some(FieldValue::Timestamp(ts)) => Some(ts),
            Some(other) => {
                self.fields.insert(START_TIME.to_string(), other);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }
}

/// Convert nanoseconds since the Unix epoch to a UTC timestamp
pub fn timestamp_from_unix_nanos(unix_nanos: u64) -> DateTime<Utc> {
    // i64 nanoseconds cover dates up to 2262; anything beyond is clamped
    let nanos = i64::try_from(unix_nanos).unwrap_or(i64::MAX);
    Utc.timestamp_nanos(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let mut event = Event::new();
        assert!(event.insert_if_absent(NAME, "first"));
        assert!(!event.insert_if_absent(NAME, "second"));
        assert_eq!(event.get_str(NAME), Some("first"));
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let mut event = Event::new();
        event.insert(NAME, "GET /users");
        event.insert(DURATION_MS, 1.5);
        event.insert(ERROR, true);
        event.insert(STATUS_CODE, 2i64);
        event.insert(START_TIME, timestamp_from_unix_nanos(1_700_000_000_000_000_000));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "GET /users");
        assert_eq!(json["duration_ms"], 1.5);
        assert_eq!(json["error"], true);
        assert_eq!(json["response.status_code"], 2);
        assert_eq!(json["start_time"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_fields_stay_sorted_by_key() {
        let mut event = Event::new();
        assert!(event.is_empty());

        event.insert(TRACE_ID, "00000000000000000000000000000001");
        event.insert(NAME, "GET /users");
        event.insert(DURATION_MS, 1.5);
        assert_eq!(event.len(), 3);

        let keys: Vec<&str> = event.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, [DURATION_MS, NAME, TRACE_ID]);

        assert_eq!(event.remove(NAME), Some(FieldValue::from("GET /users")));
        assert_eq!(event.len(), 2);
    }

    #[test]
    fn test_take_start_time() {
        let mut event = Event::new();
        let ts = timestamp_from_unix_nanos(1_500_000_000);
        event.insert(START_TIME, ts);

        assert_eq!(event.take_start_time(), Some(ts));
        assert!(!event.contains_key(START_TIME));
        assert_eq!(event.take_start_time(), None);
    }

    #[test]
    fn test_timestamp_keeps_nanosecond_precision() {
        let ts = timestamp_from_unix_nanos(1_000_000_123);
        assert_eq!(ts.timestamp(), 1);
        assert_eq!(ts.timestamp_subsec_nanos(), 123);
    }
}
