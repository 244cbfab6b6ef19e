//! Honeycomb span exporter
//!
//! This library flattens finished spans into Honeycomb events and delivers
//! them either to the Honeycomb batch API or, for debugging, to a local
//! stream as JSON lines.

pub mod config;
pub mod console;
pub mod errors;
pub mod event;
pub mod exporter;
pub mod sink;
pub mod span;
pub mod translate;
pub mod transport;

pub use config::Config;
pub use console::ConsoleSink;
pub use errors::{ExporterError, Result};
pub use event::{Event, FieldValue};
pub use exporter::{HoneycombExporter, SpanExporter};
pub use sink::EventSink;
pub use span::{
    KeyValue, Link, Parent, Resource, SpanContext, SpanData, SpanEvent, SpanId, SpanKind, Status,
    StatusCode, TraceId, Value, format_span_id, format_trace_id,
};
pub use translate::translate_spans;
pub use transport::HttpTransport;
