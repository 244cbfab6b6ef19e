//! Line-oriented JSON sink for local debugging and log-shipping setups

use std::io::{self, Write};

use async_trait::async_trait;

use crate::errors::{ExporterError, Result};
use crate::event::Event;
use crate::sink::EventSink;

pub type Formatter = Box<dyn Fn(&Event) -> Result<String> + Send + Sync>;

/// Writes each event to a stream as soon as it is sent.
///
/// `start_time` is dropped before formatting; whatever collects the stream
/// stamps lines itself.
pub struct ConsoleSink<W: Write + Send = io::Stdout> {
    out: W,
    formatter: Formatter,
    closed: bool,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            formatter: Box::new(json_line),
            closed: false,
        }
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Default formatter: compact JSON followed by a newline
pub fn json_line(event: &Event) -> Result<String> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

#[async_trait]
impl<W: Write + Send> EventSink for ConsoleSink<W> {
    async fn send(&mut self, mut event: Event) -> Result<()> {
        if self.closed {
            return Err(ExporterError::Closed);
        }

        event.take_start_time();
        let line = (self.formatter)(&event)?;
        self.out.write_all(line.as_bytes())?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.flush().await
    }
}

impl<W: Write + Send> std::fmt::Debug for ConsoleSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, timestamp_from_unix_nanos};
    use serde_json::Value;

    fn test_event() -> Event {
        let mut ev = Event::new();
        ev.insert(event::NAME, "GET /users");
        ev.insert(event::START_TIME, timestamp_from_unix_nanos(1_000));
        ev.insert(event::DURATION_MS, 1.5);
        ev
    }

    #[tokio::test]
    async fn test_writes_one_json_line_per_event() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.send(test_event()).await.unwrap();
        sink.send(test_event()).await.unwrap();
        sink.flush().await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["name"], "GET /users");
        assert_eq!(parsed["duration_ms"], 1.5);
        assert!(parsed.get("start_time").is_none());
    }

    #[tokio::test]
    async fn test_custom_formatter() {
        let mut sink = ConsoleSink::new(Vec::new()).with_formatter(Box::new(|ev: &Event| {
            Ok(format!("{}\n", ev.get_str(event::NAME).unwrap_or("?")))
        }));
        sink.send(test_event()).await.unwrap();

        assert_eq!(sink.get_ref().as_slice(), b"GET /users\n");
    }

    #[tokio::test]
    async fn test_closed_sink_refuses_events() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.send(test_event()).await.unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();

        let err = sink.send(test_event()).await.unwrap_err();
        assert!(matches!(err, ExporterError::Closed));
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap().lines().count(), 1);
    }
}
