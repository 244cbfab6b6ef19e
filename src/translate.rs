//! Flattening of spans into Honeycomb events
//!
//! Each span becomes one event per link, one event per span event and a
//! primary event, emitted in that order. The primary event always comes
//! last so consumers reading a stream can treat it as the end of a span's
//! group. Link events carry the owning span's name, so every event has a
//! `name`.
//!
//! Every field the translator writes itself is reserved. Attributes only
//! fill keys that are still free; a colliding attribute is dropped and
//! logged at debug level. On primary events span attributes are merged
//! before resource attributes, so a span attribute shadows a resource
//! attribute of the same name. Resource attributes are only merged into
//! primary events.

use tracing::debug;

use crate::errors::{ExporterError, Result};
use crate::event::{self, Event, timestamp_from_unix_nanos};
use crate::span::{KeyValue, SpanData, format_span_id, format_trace_id};

/// Flatten a batch of spans, keeping input order.
///
/// Fails on the first malformed span.
pub fn translate_spans(spans: &[SpanData]) -> Result<Vec<Event>> {
    let mut events = Vec::with_capacity(spans.len());
    for (index, span) in spans.iter().enumerate() {
        let group = translate_span(span).map_err(|e| match e {
            ExporterError::Translation(msg) => {
                ExporterError::Translation(format!("span #{} ({:?}): {}", index, span.name, msg))
            }
            other => other,
        })?;
        events.extend(group);
    }
    Ok(events)
}

/// Flatten one span into its link events, span events and primary event
pub fn translate_span(span: &SpanData) -> Result<Vec<Event>> {
    validate_span(span)?;

    let mut events = Vec::with_capacity(span.links.len() + span.events.len() + 1);
    events.extend(span_links(span));
    events.extend(span_events(span));
    events.push(primary_event(span));
    Ok(events)
}

fn validate_span(span: &SpanData) -> Result<()> {
    if !span.context.trace_id.is_valid() {
        return Err(ExporterError::Translation("invalid trace id".to_string()));
    }

    if !span.context.span_id.is_valid() {
        return Err(ExporterError::Translation("invalid span id".to_string()));
    }

    if span.end_time_unix_nano < span.start_time_unix_nano {
        return Err(ExporterError::Translation(format!(
            "end time {} precedes start time {}",
            span.end_time_unix_nano, span.start_time_unix_nano
        )));
    }

    if let Some(link) = span.links.iter().find(|link| !link.context.is_valid()) {
        return Err(ExporterError::Translation(format!(
            "link to invalid context {}/{}",
            link.context.trace_id, link.context.span_id
        )));
    }

    Ok(())
}

/// Build the event describing the span itself
pub fn primary_event(span: &SpanData) -> Event {
    let duration_ns = span.end_time_unix_nano.saturating_sub(span.start_time_unix_nano);

    let mut ev = Event::new();
    ev.insert(event::TRACE_ID, format_trace_id(span.context.trace_id));
    ev.insert(event::SPAN_ID, format_span_id(span.context.span_id));
    if let Some(parent_id) = span.parent.span_id() {
        ev.insert(event::PARENT_ID, format_span_id(parent_id));
    }
    ev.insert(event::NAME, span.name.as_str());
    ev.insert(event::START_TIME, timestamp_from_unix_nanos(span.start_time_unix_nano));
    ev.insert(event::DURATION_MS, duration_ns as f64 / 1e6);
    ev.insert(event::STATUS_CODE, span.status.code.value());
    if let Some(description) = &span.status.description {
        ev.insert(event::STATUS_MESSAGE, description.as_str());
    }
    ev.insert(event::SPAN_KIND, span.kind.to_string());
    if !span.status.code.is_ok() {
        ev.insert(event::ERROR, true);
    }

    merge_attributes(&mut ev, &span.attributes);
    merge_attributes(&mut ev, &span.resource.attributes);
    ev
}

/// Build one annotation event per link
pub fn span_links(span: &SpanData) -> Vec<Event> {
    let trace_id = format_trace_id(span.context.trace_id);
    let span_id = format_span_id(span.context.span_id);

    span.links
        .iter()
        .map(|link| {
            let mut ev = Event::new();
            ev.insert(event::TRACE_ID, trace_id.as_str());
            ev.insert(event::PARENT_ID, span_id.as_str());
            ev.insert(event::LINK_TRACE_ID, format_trace_id(link.context.trace_id));
            ev.insert(event::LINK_SPAN_ID, format_span_id(link.context.span_id));
            ev.insert(event::NAME, span.name.as_str());
            ev.insert(event::ANNOTATION_TYPE, "link");
            ev.insert(event::REF_TYPE, 0i64);
            ev.insert(event::START_TIME, timestamp_from_unix_nanos(span.start_time_unix_nano));
            merge_attributes(&mut ev, &link.attributes);
            ev
        })
        .collect()
}

/// Build one annotation event per span event, timed at the event itself
pub fn span_events(span: &SpanData) -> Vec<Event> {
    let trace_id = format_trace_id(span.context.trace_id);
    let span_id = format_span_id(span.context.span_id);

    span.events
        .iter()
        .map(|span_event| {
            let mut ev = Event::new();
            ev.insert(event::START_TIME, timestamp_from_unix_nanos(span_event.time_unix_nano));
            ev.insert(event::DURATION_MS, 0i64);
            ev.insert(event::NAME, span_event.name.as_str());
            ev.insert(event::TRACE_ID, trace_id.as_str());
            ev.insert(event::PARENT_ID, span_id.as_str());
            ev.insert(event::ANNOTATION_TYPE, "span_event");
            merge_attributes(&mut ev, &span_event.attributes);
            ev
        })
        .collect()
}

fn merge_attributes(ev: &mut Event, attributes: &[KeyValue]) {
    for kv in attributes {
        if !ev.insert_if_absent(&kv.key, &kv.value) {
            debug!("Ignoring attribute {} that collides with an existing field", kv.key);
        }
    }
}
