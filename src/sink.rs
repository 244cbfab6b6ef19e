//! Delivery seam between the exporter and a transport

use async_trait::async_trait;

use crate::errors::Result;
use crate::event::Event;

/// Destination for flat events.
///
/// `send` may buffer; `flush` must push everything buffered so far and
/// report whether it was accepted. `close` flushes; afterwards `send`
/// fails with `ExporterError::Closed` and further `close` calls are no-ops.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: Event) -> Result<()>;

    async fn flush(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
