//! Span exporters: translation plus delivery through a sink

use crate::config::Config;
use crate::console::ConsoleSink;
use crate::errors::{ExporterError, Result};
use crate::event::{self, FieldValue};
use crate::sink::EventSink;
use crate::span::SpanData;
use crate::translate::translate_span;
use crate::transport::HttpTransport;

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exporter interface driven by a span processor.
///
/// `Ok(())` from `export` means every span of the batch was translated and
/// delivered. Callers must serialize calls on one exporter.
#[async_trait]
pub trait SpanExporter: Send {
    async fn export(&mut self, batch: &[SpanData]) -> Result<()>;

    async fn force_flush(&mut self) -> Result<()>;

    async fn shutdown(&mut self) -> Result<()>;
}

/// Exporter writing Honeycomb events to a sink.
///
/// Holds the sink while ready; `shutdown` releases it for good and any later
/// `export` fails with `ExporterError::Closed`.
pub struct HoneycombExporter<S: EventSink> {
    sink: Option<S>,
    global_fields: Vec<(String, FieldValue)>,
    shutdown_timeout: Duration,
    exporter_id: String,
    stats: ExporterStats,
}

impl HoneycombExporter<HttpTransport> {
    /// Create an exporter sending to the Honeycomb API.
    ///
    /// Unset options are taken from the environment; missing credentials
    /// are a configuration error.
    pub fn new(config: Config) -> Result<Self> {
        let config = config.resolve();
        config.validate().map_err(ExporterError::Config)?;

        let transport = HttpTransport::new(&config)?;

        let exporter = Self::with_sink(transport)
            .with_service_name(config.service_name.as_str())
            .with_global_field(event::LOCAL_HOSTNAME, config.local_hostname.as_str())
            .with_shutdown_timeout(config.shutdown_timeout);

        info!(
            "Honeycomb exporter {} ready - dataset: {}, service: {}, host: {}",
            exporter.exporter_id, config.dataset, config.service_name, config.api_host
        );

        Ok(exporter)
    }
}

impl HoneycombExporter<ConsoleSink<io::Stdout>> {
    /// Create an exporter printing events to stdout, one JSON object per line
    pub fn console(service_name: Option<&str>) -> Self {
        let exporter = Self::with_sink(ConsoleSink::stdout());
        match service_name {
            Some(name) => exporter.with_service_name(name),
            None => exporter,
        }
    }
}

impl<S: EventSink> HoneycombExporter<S> {
    /// Create an exporter around any sink
    pub fn with_sink(sink: S) -> Self {
        Self {
            sink: Some(sink),
            global_fields: vec![(
                event::EXPORTER_VERSION.to_string(),
                FieldValue::from(VERSION),
            )],
            shutdown_timeout: Config::default().shutdown_timeout,
            exporter_id: Uuid::new_v4().to_string(),
            stats: ExporterStats::default(),
        }
    }

    /// Tag every event with `service_name`. Empty names are ignored.
    pub fn with_service_name(self, service_name: &str) -> Self {
        if service_name.is_empty() {
            return self;
        }
        self.with_global_field(event::SERVICE_NAME, service_name)
    }

    /// Add a field to every event unless the event already has that key
    pub fn with_global_field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        let value = value.into();
        match self.global_fields.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.global_fields.push((key.to_string(), value)),
        }
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn is_shutdown(&self) -> bool {
        self.sink.is_none()
    }

    /// The sink, while the exporter is not shut down
    pub fn sink(&self) -> Option<&S> {
        self.sink.as_ref()
    }

    pub fn exporter_id(&self) -> &str {
        &self.exporter_id
    }

    pub fn stats(&self) -> ExporterStats {
        self.stats.clone()
    }
}

#[async_trait]
impl<S: EventSink> SpanExporter for HoneycombExporter<S> {
    #[instrument(skip_all, fields(spans = batch.len()))]
    async fn export(&mut self, batch: &[SpanData]) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(ExporterError::Closed)?;
        let batch_id = Uuid::new_v4();

        let mut events = Vec::new();
        let mut rejected_spans = 0;
        for span in batch {
            match translate_span(span) {
                Ok(group) => events.extend(group),
                Err(e) => {
                    rejected_spans += 1;
                    warn!(
                        "Dropping span {:?} ({}/{}) from batch {}: {}",
                        span.name, span.context.trace_id, span.context.span_id, batch_id, e
                    );
                }
            }
        }

        let total_events = events.len();
        debug!(
            "Batch {}: {} spans translated into {} events",
            batch_id,
            batch.len() - rejected_spans,
            total_events
        );

        let mut failed_events = 0;
        for mut ev in events {
            for (key, value) in &self.global_fields {
                ev.insert_if_absent(key, value.clone());
            }
            if let Err(e) = sink.send(ev).await {
                warn!("Batch {}: event not delivered: {}", batch_id, e);
                failed_events += undelivered(&e);
            }
        }

        if let Err(e) = sink.flush().await {
            warn!("Batch {}: flush failed: {}", batch_id, e);
            failed_events += undelivered(&e);
        }
        let failed_events = failed_events.min(total_events);

        self.stats.batches += 1;
        self.stats.spans_rejected += rejected_spans as u64;
        self.stats.events_sent += (total_events - failed_events) as u64;
        self.stats.events_failed += failed_events as u64;

        if rejected_spans > 0 || failed_events > 0 {
            return Err(ExporterError::ExportFailed {
                rejected_spans,
                failed_events,
                total_events,
            });
        }

        debug!("Batch {} exported", batch_id);
        Ok(())
    }

    async fn force_flush(&mut self) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(ExporterError::Closed)?;
        sink.flush().await
    }

    #[instrument(skip(self))]
    async fn shutdown(&mut self) -> Result<()> {
        let Some(mut sink) = self.sink.take() else {
            debug!("Exporter {} already shut down", self.exporter_id);
            return Ok(());
        };

        info!("Shutting down exporter {}", self.exporter_id);

        let result = match timeout(self.shutdown_timeout, sink.close()).await {
            Ok(result) => result,
            Err(_) => Err(ExporterError::Timeout(format!(
                "sink did not close within {:?}",
                self.shutdown_timeout
            ))),
        };
        drop(sink);

        info!(
            "Exporter {} shutdown complete - {} batches, {} events sent, {} failed, {} spans rejected",
            self.exporter_id,
            self.stats.batches,
            self.stats.events_sent,
            self.stats.events_failed,
            self.stats.spans_rejected
        );
        result
    }
}

/// Events a sink error accounts for
fn undelivered(err: &ExporterError) -> usize {
    match err {
        ExporterError::Delivery { failed, .. } => *failed,
        _ => 1,
    }
}

impl<S: EventSink> std::fmt::Debug for HoneycombExporter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HoneycombExporter")
            .field("exporter_id", &self.exporter_id)
            .field("shut_down", &self.is_shutdown())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Exporter statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExporterStats {
    pub batches: u64,
    pub events_sent: u64,
    pub events_failed: u64,
    pub spans_rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::span::{SpanContext, SpanEvent, SpanId, TraceId};
    use std::sync::{Arc, Mutex};

    /// Sink recording events and failing on demand
    #[derive(Clone, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<Event>>>,
        flushes: Arc<Mutex<usize>>,
        closes: Arc<Mutex<usize>>,
        fail_names: Vec<String>,
        hang_on_close: bool,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn send(&mut self, ev: Event) -> Result<()> {
            let name = ev.get_str(event::NAME).unwrap_or_default().to_string();
            if self.fail_names.contains(&name) {
                return Err(ExporterError::Transport(format!("refused {}", name)));
            }
            self.events.lock().unwrap().push(ev);
            Ok(())
        }

        async fn flush(&mut self) -> Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            *self.closes.lock().unwrap() += 1;
            if self.hang_on_close {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn test_span(name: &str) -> SpanData {
        SpanData::new(
            SpanContext::new(TraceId::random(), SpanId::random()),
            name,
            1_700_000_000_000_000_000,
        )
        .with_duration_nanos(1_000_000)
    }

    #[tokio::test]
    async fn test_export_sends_every_event_and_flushes() {
        let sink = RecordingSink::default();
        let mut exporter = HoneycombExporter::with_sink(sink.clone()).with_service_name("checkout");

        let span = test_span("parent").with_event(SpanEvent::new("child", 1_700_000_000_000_000_010));
        exporter.export(&[span, test_span("other")]).await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|ev| ev.get_str(event::SERVICE_NAME) == Some("checkout")));
        assert!(events.iter().all(|ev| ev.get_str(event::EXPORTER_VERSION) == Some(VERSION)));
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
        assert_eq!(exporter.stats().events_sent, 3);
    }

    #[tokio::test]
    async fn test_attributes_shadow_global_fields() {
        let sink = RecordingSink::default();
        let mut exporter = HoneycombExporter::with_sink(sink.clone()).with_service_name("default");

        let span = test_span("op").with_attribute("service_name", "override");
        exporter.export(&[span]).await.unwrap();

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].get_str(event::SERVICE_NAME), Some("override"));
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds() {
        let sink = RecordingSink::default();
        let mut exporter = HoneycombExporter::with_sink(sink.clone());

        exporter.export(&[]).await.unwrap();
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_fails_batch() {
        let sink = RecordingSink {
            fail_names: vec!["refused".to_string()],
            ..RecordingSink::default()
        };
        let mut exporter = HoneycombExporter::with_sink(sink.clone());

        let err = exporter
            .export(&[test_span("fine"), test_span("refused")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExporterError::ExportFailed { rejected_spans: 0, failed_events: 1, total_events: 2 }
        ));
        assert_eq!(sink.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_span_is_rejected_alone() {
        let sink = RecordingSink::default();
        let mut exporter = HoneycombExporter::with_sink(sink.clone());

        let broken = test_span("broken").with_end_time(0);
        let err = exporter.export(&[broken, test_span("fine")]).await.unwrap_err();

        assert!(matches!(
            err,
            ExporterError::ExportFailed { rejected_spans: 1, failed_events: 0, total_events: 1 }
        ));
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get_str(event::NAME), Some("fine"));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let sink = RecordingSink::default();
        let mut exporter = HoneycombExporter::with_sink(sink.clone());

        exporter.shutdown().await.unwrap();
        assert!(exporter.is_shutdown());
        exporter.shutdown().await.unwrap();

        assert_eq!(*sink.closes.lock().unwrap(), 1);
        assert!(exporter.sink().is_none());
    }

    #[tokio::test]
    async fn test_export_after_shutdown_fails() {
        let sink = RecordingSink::default();
        let mut exporter = HoneycombExporter::with_sink(sink.clone());
        exporter.shutdown().await.unwrap();

        let err = exporter.export(&[test_span("late")]).await.unwrap_err();
        assert!(matches!(err, ExporterError::Closed));
        assert!(matches!(exporter.force_flush().await, Err(ExporterError::Closed)));
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded() {
        let sink = RecordingSink {
            hang_on_close: true,
            ..RecordingSink::default()
        };
        let mut exporter = HoneycombExporter::with_sink(sink)
            .with_shutdown_timeout(Duration::from_millis(20));

        let err = exporter.shutdown().await.unwrap_err();
        assert!(matches!(err, ExporterError::Timeout(_)));
        assert!(exporter.is_shutdown());
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = Config {
            writekey: String::new(),
            dataset: "ds".to_string(),
            ..Config::default()
        };
        // only meaningful when the environment does not provide a key
        if std::env::var("HONEYCOMB_WRITEKEY").is_err() {
            let err = HoneycombExporter::new(config).unwrap_err();
            assert!(matches!(err, ExporterError::Config(_)));
        }
    }

    #[test]
    fn test_new_tags_service_and_host() {
        let config = Config::new("key", "ds")
            .with_service_name("checkout")
            .with_local_hostname("web-1");
        let exporter = HoneycombExporter::new(config).unwrap();

        assert!(exporter.global_fields.contains(&(
            event::SERVICE_NAME.to_string(),
            FieldValue::from("checkout")
        )));
        assert!(exporter.global_fields.contains(&(
            event::LOCAL_HOSTNAME.to_string(),
            FieldValue::from("web-1")
        )));
    }

    #[test]
    fn test_each_exporter_gets_its_own_id() {
        let first = HoneycombExporter::with_sink(RecordingSink::default());
        let second = HoneycombExporter::with_sink(RecordingSink::default());

        assert!(Uuid::parse_str(first.exporter_id()).is_ok());
        assert_ne!(first.exporter_id(), second.exporter_id());
    }
}
