use http::HeaderValue;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("max_attempts must be at least 1")]
    InvalidAttempts,

    #[error("max_backoff_ms ({max}) is lower than initial_backoff_ms ({initial})")]
    InvalidBackoff { initial: u64, max: u64 },

    #[error("Empty workspace id")]
    EmptyWorkspace,

    #[error("Workspace id is not a valid header value: {0}")]
    InvalidWorkspace(String),

    #[error("Auth body must be a JSON object")]
    InvalidAuthBody,
}

/// Collector service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for aggregation requests
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    /// Token endpoint
    pub auth: AuthConfig,
    /// Paginated data endpoint
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum accepted size of an inbound request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Overall deadline for one aggregation. No deadline when unset.
    #[serde(default)]
    pub aggregation_timeout_secs: Option<u64>,
}

impl Config {
    /// Validates the collector configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if !self.auth.body.is_object() {
            return Err(ValidationError::InvalidAuthBody);
        }

        self.upstream.validate()?;
        self.retry.validate()?;

        Ok(())
    }

    pub fn aggregation_timeout(&self) -> Option<Duration> {
        self.aggregation_timeout_secs.map(Duration::from_secs)
    }
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Token endpoint configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthConfig {
    pub url: Url,
    /// Credentials posted verbatim as the JSON request body
    pub body: serde_json::Value,
}

/// Paginated data endpoint configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL; the page number and filters are appended as query parameters
    pub url: Url,
    /// Sent as the `Workspace` header on every data request
    pub workspace: String,
    /// Subtracted from the page count reported by the upstream
    #[serde(default)]
    pub page_deduction: u32,
    /// Upper bound on concurrently outstanding page requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.workspace_header()?;
        if self.max_concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        Ok(())
    }

    /// The workspace id as a `Workspace` header value.
    pub fn workspace_header(&self) -> Result<HeaderValue, ValidationError> {
        if self.workspace.is_empty() {
            return Err(ValidationError::EmptyWorkspace);
        }
        HeaderValue::from_str(&self.workspace)
            .map_err(|_| ValidationError::InvalidWorkspace(self.workspace.clone()))
    }
}

fn default_max_concurrency() -> usize {
    10
}

/// Retry and timeout policy applied to every outbound request
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each subsequent retry
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Per-attempt timeout
    pub http_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            http_timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::InvalidAttempts);
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ValidationError::InvalidBackoff {
                initial: self.initial_backoff_ms,
                max: self.max_backoff_ms,
            });
        }
        Ok(())
    }
}

/// Cross-origin settings for the aggregation endpoint
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CorsConfig {
    /// Origins allowed to call the endpoint. Any origin is reflected when empty.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }
}
