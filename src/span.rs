//! Span data handed to the exporter by the tracing pipeline

use std::fmt;
use std::sync::Arc;

/// 128-bit trace identifier. Zero is the invalid id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

/// 64-bit span identifier. Zero is the invalid id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl TraceId {
    pub const INVALID: TraceId = TraceId(0);

    pub const fn from_u128(value: u128) -> Self {
        Self(value)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Generate a new random, valid trace ID
    pub fn random() -> Self {
        loop {
            let id = rand::random::<u128>();
            if id != 0 {
                return Self(id);
            }
        }
    }
}

impl SpanId {
    pub const INVALID: SpanId = SpanId(0);

    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Generate a new random, valid span ID
    pub fn random() -> Self {
        loop {
            let id = rand::random::<u64>();
            if id != 0 {
                return Self(id);
            }
        }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Render a trace ID as 32 lowercase hex characters, no prefix.
///
/// Every trace id written into an event goes through here so that events
/// can be correlated by plain string equality.
pub fn format_trace_id(trace_id: TraceId) -> String {
    trace_id.to_string()
}

/// Render a span ID as 16 lowercase hex characters, no prefix.
pub fn format_span_id(span_id: SpanId) -> String {
    span_id.to_string()
}

/// Identity of a span, possibly one living in another process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub is_remote: bool,
}

impl SpanContext {
    pub fn new(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            is_remote: false,
        }
    }

    pub fn remote(trace_id: TraceId, span_id: SpanId) -> Self {
        Self {
            trace_id,
            span_id,
            is_remote: true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}

/// Back-reference from a span to its parent
#[derive(Clone, Debug, Default)]
pub enum Parent {
    /// No parent, the span starts a trace
    #[default]
    Root,
    /// Parent span recorded in this process
    Local(Arc<SpanData>),
    /// Parent known only through propagated context
    Remote(SpanContext),
}

impl Parent {
    /// Span ID of the parent, `None` for root spans
    pub fn span_id(&self) -> Option<SpanId> {
        match self {
            Parent::Root => None,
            Parent::Local(span) => Some(span.context.span_id),
            Parent::Remote(context) => Some(context.span_id),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanKind::Internal => write!(f, "internal"),
            SpanKind::Server => write!(f, "server"),
            SpanKind::Client => write!(f, "client"),
            SpanKind::Producer => write!(f, "producer"),
            SpanKind::Consumer => write!(f, "consumer"),
        }
    }
}

/// Canonical status codes. Everything but `Ok` is a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum StatusCode {
    #[default]
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    pub fn value(self) -> i64 {
        self as i64
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct Status {
    pub code: StatusCode,
    pub description: Option<String>,
}

impl Status {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: Some(description.into()),
        }
    }
}

/// Attribute value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Causal reference to another span that is not the parent
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub context: SpanContext,
    pub attributes: Vec<KeyValue>,
}

impl Link {
    pub fn new(context: SpanContext) -> Self {
        Self {
            context,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }
}

/// Timestamped annotation recorded during a span
#[derive(Clone, Debug, PartialEq)]
pub struct SpanEvent {
    pub name: String,
    pub time_unix_nano: u64,
    pub attributes: Vec<KeyValue>,
}

impl SpanEvent {
    pub fn new(name: impl Into<String>, time_unix_nano: u64) -> Self {
        Self {
            name: name.into(),
            time_unix_nano,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }
}

/// Process-wide attributes shared by every span
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

impl Resource {
    pub fn new(attributes: Vec<KeyValue>) -> Self {
        Self { attributes }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A finished span
#[derive(Clone, Debug)]
pub struct SpanData {
    pub context: SpanContext,
    pub parent: Parent,
    pub name: String,
    pub kind: SpanKind,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub status: Status,
    pub attributes: Vec<KeyValue>,
    pub resource: Arc<Resource>,
    pub links: Vec<Link>,
    pub events: Vec<SpanEvent>,
}

impl SpanData {
    pub fn new(context: SpanContext, name: impl Into<String>, start_time_unix_nano: u64) -> Self {
        Self {
            context,
            parent: Parent::Root,
            name: name.into(),
            kind: SpanKind::Internal,
            start_time_unix_nano,
            end_time_unix_nano: start_time_unix_nano,
            status: Status::ok(),
            attributes: Vec::new(),
            resource: Arc::new(Resource::empty()),
            links: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: Parent) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_end_time(mut self, end_time_unix_nano: u64) -> Self {
        self.end_time_unix_nano = end_time_unix_nano;
        self
    }

    pub fn with_duration_nanos(mut self, duration_nanos: u64) -> Self {
        self.end_time_unix_nano = self.start_time_unix_nano.saturating_add(duration_nanos);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push(KeyValue::new(key, value));
        self
    }

    pub fn with_resource(mut self, resource: Arc<Resource>) -> Self {
        self.resource = resource;
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    pub fn with_event(mut self, event: SpanEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Context a child of this span would carry as its parent
    pub fn as_parent(self: &Arc<Self>) -> Parent {
        Parent::Local(Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_formatting_width() {
        assert_eq!(
            format_trace_id(TraceId::from_u128(0xabc)),
            "00000000000000000000000000000abc"
        );
        assert_eq!(format_span_id(SpanId::from_u64(0xabc)), "0000000000000abc");
        assert_eq!(
            format_trace_id(TraceId::from_u128(u128::MAX)),
            "ffffffffffffffffffffffffffffffff"
        );
    }

    #[test]
    fn test_id_formatting_is_stable() {
        let trace_id = TraceId::random();
        assert_eq!(format_trace_id(trace_id), format_trace_id(trace_id));

        let span_id = SpanId::random();
        assert_eq!(format_span_id(span_id), format_span_id(span_id));
    }

    #[test]
    fn test_id_formatting_is_injective() {
        let mut seen = std::collections::HashSet::new();
        for i in 1..=1000u64 {
            assert!(seen.insert(format_span_id(SpanId::from_u64(i))));
        }
        assert_ne!(
            format_trace_id(TraceId::from_u128(1 << 64)),
            format_trace_id(TraceId::from_u128(1))
        );
    }

    #[test]
    fn test_id_bytes_roundtrip() {
        let bytes = [0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36];
        let trace_id = TraceId::from_bytes(bytes);
        assert_eq!(trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(trace_id.to_bytes(), bytes);
    }

    #[test]
    fn test_random_ids_are_valid() {
        assert!(TraceId::random().is_valid());
        assert!(SpanId::random().is_valid());
        assert!(!TraceId::INVALID.is_valid());
        assert!(!SpanId::INVALID.is_valid());
    }

    #[test]
    fn test_parent_span_id() {
        let trace_id = TraceId::from_u128(1);
        let parent = Arc::new(SpanData::new(
            SpanContext::new(trace_id, SpanId::from_u64(7)),
            "parent",
            0,
        ));

        assert_eq!(Parent::Root.span_id(), None);
        assert_eq!(parent.as_parent().span_id(), Some(SpanId::from_u64(7)));
        assert_eq!(
            Parent::Remote(SpanContext::remote(trace_id, SpanId::from_u64(9))).span_id(),
            Some(SpanId::from_u64(9))
        );
    }

    #[test]
    fn test_status_code_values() {
        assert_eq!(StatusCode::Ok.value(), 0);
        assert!(StatusCode::Ok.is_ok());
        assert!(!StatusCode::Unknown.is_ok());
        assert_eq!(StatusCode::Unauthenticated.value(), 16);
    }

    #[test]
    fn test_span_builder() {
        let span = SpanData::new(SpanContext::new(TraceId::random(), SpanId::random()), "op", 1_000)
            .with_kind(SpanKind::Client)
            .with_duration_nanos(250)
            .with_attribute("http.method", "GET");

        assert_eq!(span.end_time_unix_nano, 1_250);
        assert_eq!(span.kind.to_string(), "client");
        assert_eq!(span.attributes[0], KeyValue::new("http.method", "GET"));
        assert!(matches!(span.parent, Parent::Root));
    }
}
