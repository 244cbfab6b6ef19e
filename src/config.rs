//! Configuration management for the Honeycomb exporter

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_API_HOST: &str = "https://api.honeycomb.io";

/// Reported when the host name cannot be determined
pub const UNKNOWN_HOST: &str = "unknown-host";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Honeycomb API key
    pub writekey: String,

    /// Dataset events are written to
    pub dataset: String,

    /// Service name tagged onto every event. Empty means the dataset name.
    pub service_name: String,

    /// Base URL of the ingestion API
    pub api_host: String,

    /// Host name reported as `meta.local_hostname`
    pub local_hostname: String,

    /// HTTP timeout for a single request
    pub http_timeout: Duration,

    /// Upper bound for the final flush on shutdown
    pub shutdown_timeout: Duration,

    /// Maximum retry attempts for failed transmissions
    pub max_retries: u32,

    /// Retry backoff base
    pub retry_backoff_ms: u64,

    /// Events buffered before the transport flushes on its own
    pub max_batch_size: usize,

    /// Run transport requests outside the caller's tracing span
    pub raw_transport: bool,

    /// Extra token appended to the User-Agent header
    pub user_agent_addition: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            writekey: String::new(),
            dataset: String::new(),
            service_name: String::new(),
            api_host: DEFAULT_API_HOST.to_string(),
            local_hostname: UNKNOWN_HOST.to_string(),
            http_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff_ms: 100,
            max_batch_size: 100,
            raw_transport: true,
            user_agent_addition: None,
        }
    }
}

impl Config {
    pub fn new(writekey: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            writekey: writekey.into(),
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Config::default().resolve()
    }

    /// Fill every option that is still unset from the environment.
    pub fn resolve(self) -> Self {
        self.resolve_with(|key| env::var(key).ok())
    }

    /// Fill every option that is still unset, reading variables through `lookup`.
    ///
    /// Explicit values win, then `HONEYCOMB_*` variables, then defaults.
    /// The service name falls back to the dataset name last. The local
    /// hostname comes from the operating system.
    pub fn resolve_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if self.writekey.is_empty() {
            if let Some(writekey) = lookup("HONEYCOMB_WRITEKEY") {
                self.writekey = writekey;
            }
        }

        if self.dataset.is_empty() {
            if let Some(dataset) = lookup("HONEYCOMB_DATASET") {
                self.dataset = dataset;
            }
        }

        if self.service_name.is_empty() {
            if let Some(service_name) = lookup("HONEYCOMB_SERVICE") {
                self.service_name = service_name;
            }
        }

        if self.service_name.is_empty() {
            self.service_name = self.dataset.clone();
        }

        if self.api_host == DEFAULT_API_HOST {
            if let Some(api_host) = lookup("HONEYCOMB_API_HOST") {
                self.api_host = api_host;
            }
        }

        if self.local_hostname == UNKNOWN_HOST {
            if let Some(hostname) = system_hostname() {
                self.local_hostname = hostname;
            }
        }

        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = service_name.into();
        self
    }

    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self
    }

    pub fn with_local_hostname(mut self, local_hostname: impl Into<String>) -> Self {
        self.local_hostname = local_hostname.into();
        self
    }

    pub fn with_http_timeout(mut self, http_timeout: Duration) -> Self {
        self.http_timeout = http_timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_raw_transport(mut self, raw_transport: bool) -> Self {
        self.raw_transport = raw_transport;
        self
    }

    pub fn with_user_agent_addition(mut self, addition: impl Into<String>) -> Self {
        self.user_agent_addition = Some(addition.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.writekey.is_empty() {
            return Err("writekey cannot be empty".to_string());
        }

        if self.dataset.is_empty() {
            return Err("dataset cannot be empty".to_string());
        }

        if !(self.api_host.starts_with("http://") || self.api_host.starts_with("https://")) {
            return Err(format!("api_host must be an http(s) URL, got {:?}", self.api_host));
        }

        if self.max_batch_size == 0 {
            return Err("max_batch_size must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn system_hostname() -> Option<String> {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|hostname| !hostname.is_empty())
}
