use std::time::Duration;
use thiserror::Error;

/// Result type alias for collector operations
pub type Result<T, E = CollectorError> = std::result::Result<T, E>;

/// Final failure of an outbound request once its retry budget is spent.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{method} {url} failed after {attempts} attempt(s): {message}")]
pub struct TransportError {
    pub method: reqwest::Method,
    pub url: String,
    pub attempts: u32,
    /// Message of the last failed attempt
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("token response has no token field")]
    MalformedTokenResponse,
}

#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("page count probe failed: {0}")]
    Transport(#[from] TransportError),

    #[error("page count probe returned no usable pages field: {0}")]
    MissingPageCount(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("page {page} could not be fetched: {message}")]
pub struct PageFetchError {
    pub page: u32,
    pub message: String,
}

/// Errors that end a single aggregation request
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error(transparent)]
    PageFetch(#[from] PageFetchError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("aggregation did not finish within {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by the listeners themselves
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] crate::config::ValidationError),
}
