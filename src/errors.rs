//! Error types for the span exporter

use std::fmt;

pub type Result<T> = std::result::Result<T, ExporterError>;

#[derive(Debug)]
pub enum ExporterError {
    /// IO operation failed
    Io(std::io::Error),

    /// HTTP request failed
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Configuration error
    Config(String),

    /// A span could not be flattened into events
    Translation(String),

    /// Transport error
    Transport(String),

    /// Some events of a flush were not accepted by the backend
    Delivery { failed: usize, total: usize },

    /// A batch export did not fully succeed
    ExportFailed {
        rejected_spans: usize,
        failed_events: usize,
        total_events: usize,
    },

    /// Operation did not complete in time
    Timeout(String),

    /// The exporter or sink has been shut down
    Closed,
}

impl fmt::Display for ExporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterError::Io(err) => write!(f, "IO error: {}", err),
            ExporterError::Http(err) => write!(f, "HTTP error: {}", err),
            ExporterError::Json(err) => write!(f, "JSON error: {}", err),
            ExporterError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ExporterError::Translation(msg) => write!(f, "Translation error: {}", msg),
            ExporterError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ExporterError::Delivery { failed, total } => {
                write!(f, "Delivery error: {} of {} events rejected", failed, total)
            }
            ExporterError::ExportFailed {
                rejected_spans,
                failed_events,
                total_events,
            } => write!(
                f,
                "Export failed: {} spans rejected, {} of {} events not delivered",
                rejected_spans, failed_events, total_events
            ),
            ExporterError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ExporterError::Closed => write!(f, "Exporter closed"),
        }
    }
}

impl std::error::Error for ExporterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExporterError::Io(err) => Some(err),
            ExporterError::Http(err) => Some(err),
            ExporterError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err)
    }
}

impl From<reqwest::Error> for ExporterError {
    fn from(err: reqwest::Error) -> Self {
        ExporterError::Http(err)
    }
}

impl From<serde_json::Error> for ExporterError {
    fn from(err: serde_json::Error) -> Self {
        ExporterError::Json(err)
    }
}
