//! HTTP transport delivering events to the Honeycomb batch API

use crate::config::Config;
use crate::errors::{ExporterError, Result};
use crate::event::{Event, FieldValue};
use crate::sink::EventSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

pub const USER_AGENT: &str = concat!("honeycomb-exporter-rust/", env!("CARGO_PKG_VERSION"));

/// Upper bound for the delay between two attempts
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Buffering HTTP sink for Honeycomb events
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    batch_url: Url,
    writekey: String,
    timeout: Duration,
    max_retries: u32,
    retry_backoff_ms: u64,
    max_batch_size: usize,
    raw_transport: bool,
    pending: Vec<Event>,
    closed: bool,
    stats: TransportStats,
}

/// One entry of a batch request body
#[derive(Debug, Serialize)]
struct BatchEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<DateTime<Utc>>,
    data: BTreeMap<String, FieldValue>,
}

/// Per-event result returned by the batch endpoint
#[derive(Debug, Deserialize)]
struct EventStatus {
    status: u16,
    #[serde(default)]
    error: Option<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(config: &Config) -> Result<Self> {
        let user_agent = match &config.user_agent_addition {
            Some(addition) => format!("{} {}", USER_AGENT, addition),
            None => USER_AGENT.to_string(),
        };

        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(ExporterError::Http)?;

        Ok(Self {
            client,
            batch_url: batch_url(&config.api_host, &config.dataset)?,
            writekey: config.writekey.clone(),
            timeout: config.http_timeout,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            max_batch_size: config.max_batch_size,
            raw_transport: config.raw_transport,
            pending: Vec::new(),
            closed: false,
            stats: TransportStats::default(),
        })
    }

    pub fn batch_url(&self) -> &Url {
        &self.batch_url
    }

    /// Number of events waiting for the next flush
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> TransportStats {
        self.stats.clone()
    }

    /// Send the buffered events as one batch, retrying on transient failures.
    ///
    /// Any failure is reported as `Delivery`; the underlying cause is logged.
    async fn send_batch(&mut self, events: Vec<Event>) -> Result<()> {
        let total = events.len();
        let payload: Vec<BatchEvent> = events
            .into_iter()
            .map(|mut event| BatchEvent {
                time: event.take_start_time(),
                data: event.into_fields(),
            })
            .collect();

        debug!("Sending batch of {} events to {}", total, self.batch_url);

        let mut attempt = 0;

        let final_error = loop {
            let outcome = match self.send_batch_attempt(&payload).await {
                Ok(response) => self.handle_response(response).await,
                Err(e) => Err(Attempt::Retry(e)),
            };

            match outcome {
                Ok(statuses) => {
                    self.stats.batches_sent += 1;
                    return self.check_statuses(&statuses, total);
                }
                Err(Attempt::Fatal(e)) => {
                    error!("Batch of {} events rejected: {}", total, e);
                    self.stats.events_failed += total as u64;
                    return Err(ExporterError::Delivery { failed: total, total });
                }
                Err(Attempt::Retry(e)) if attempt >= self.max_retries => break e,
                Err(Attempt::Retry(e)) => {
                    attempt += 1;
                    let backoff_ms = backoff_delay(self.retry_backoff_ms, attempt);
                    warn!(
                        "Failed to send batch (attempt {}), retrying in {}ms: {}",
                        attempt, backoff_ms, e
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        };

        error!(
            "Failed to send batch of {} events after {} attempts: {}",
            total,
            u64::from(self.max_retries) + 1,
            final_error
        );

        self.stats.events_failed += total as u64;
        Err(ExporterError::Delivery { failed: total, total })
    }

    /// Single attempt to post a batch
    async fn send_batch_attempt(&self, payload: &[BatchEvent]) -> Result<Response> {
        let request = self
            .client
            .post(self.batch_url.clone())
            .header("X-Honeycomb-Team", &self.writekey)
            .json(payload)
            .send();

        let response = async {
            debug!("Posting {} events to {}", payload.len(), self.batch_url);
            timeout(self.timeout, request).await
        }
        .instrument(self.request_span())
        .await;

        response
            .map_err(|_| ExporterError::Transport("Request timeout".to_string()))?
            .map_err(ExporterError::Http)
    }

    /// Span the outgoing request runs under. With `raw_transport` it is a
    /// fresh root, so the caller's span never covers the exporter's own traffic.
    fn request_span(&self) -> Span {
        if self.raw_transport {
            info_span!(parent: None, "honeycomb_transport")
        } else {
            Span::current()
        }
    }

    /// Turn the HTTP response into per-event statuses
    async fn handle_response(
        &self,
        response: Response,
    ) -> std::result::Result<Vec<EventStatus>, Attempt> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<Vec<EventStatus>>()
                .await
                .map_err(|e| Attempt::Fatal(ExporterError::Http(e)));
        }

        let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

        let error_message = match status.as_u16() {
            400 => format!("Bad request: {}", error_body),
            401 => format!("Unknown API key: {}", error_body),
            403 => format!("Forbidden: {}", error_body),
            404 => format!("Dataset endpoint not found: {}", error_body),
            413 => format!("Batch too large: {}", error_body),
            429 => format!("Rate limited: {}", error_body),
            500..=599 => format!("Server error {}: {}", status, error_body),
            _ => format!("Unexpected response {}: {}", status, error_body),
        };

        let err = ExporterError::Transport(error_message);
        if is_retryable(status) {
            Err(Attempt::Retry(err))
        } else {
            Err(Attempt::Fatal(err))
        }
    }

    fn check_statuses(&mut self, statuses: &[EventStatus], total: usize) -> Result<()> {
        let accepted = statuses
            .iter()
            .filter(|s| (200..300).contains(&s.status))
            .count();
        let failed = total.saturating_sub(accepted);

        for rejected in statuses.iter().filter(|s| !(200..300).contains(&s.status)) {
            warn!(
                "Event rejected with status {}: {}",
                rejected.status,
                rejected.error.as_deref().unwrap_or("no reason given")
            );
        }

        self.stats.events_sent += accepted as u64;
        self.stats.events_failed += failed as u64;

        if failed > 0 {
            return Err(ExporterError::Delivery { failed, total });
        }

        debug!("Batch of {} events accepted", total);
        Ok(())
    }
}

enum Attempt {
    Retry(ExporterError),
    Fatal(ExporterError),
}

/// `{api_host}/1/batch/{dataset}`, with the dataset escaped as a single path segment
fn batch_url(api_host: &str, dataset: &str) -> Result<Url> {
    let mut url = Url::parse(api_host)
        .map_err(|e| ExporterError::Config(format!("invalid api_host {:?}: {}", api_host, e)))?;

    url.path_segments_mut()
        .map_err(|_| ExporterError::Config(format!("api_host {:?} cannot be a base URL", api_host)))?
        .pop_if_empty()
        .extend(["1", "batch", dataset]);

    Ok(url)
}

/// Exponential backoff for the given attempt (1-based), capped at `MAX_BACKOFF_MS`
fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2_u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl EventSink for HttpTransport {
    async fn send(&mut self, event: Event) -> Result<()> {
        if self.closed {
            return Err(ExporterError::Closed);
        }

        self.pending.push(event);
        if self.pending.len() >= self.max_batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let events = std::mem::take(&mut self.pending);
        self.send_batch(events).await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let result = self.flush().await;
        self.closed = true;
        info!(
            "Transport closed - {} events sent, {} failed, {} batches",
            self.stats.events_sent, self.stats.events_failed, self.stats.batches_sent
        );
        result
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStats {
    pub events_sent: u64,
    pub events_failed: u64,
    pub batches_sent: u64,
}
