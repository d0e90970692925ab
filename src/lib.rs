//! Trend-Relay: an adaptive trending-listing collector
//!
//! This crate periodically fetches a ranked listing page, filters and enriches the
//! listings with generated summaries, and hands the result to a delivery sink. The
//! interesting parts are the resilience pieces: robots.txt gating, adaptive
//! per-endpoint pacing, bounded concurrency, multi-provider fallback, and a
//! calendar scheduler with retries and alerting.

pub mod alert;
pub mod app;
pub mod config;
pub mod crawler;
pub mod enrich;
pub mod pipeline;
pub mod retry;
pub mod robots;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Trend-Relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// Errors surfaced by the fetcher
///
/// `RobotsDisallowed` is final for that URL. `RateLimited` and
/// `TransientNetwork` are only returned after the retry budget is spent.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("URL disallowed by robots.txt: {url}")]
    RobotsDisallowed { url: String },

    #[error("Rate limited by {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    #[error("Transient network failure for {url} after {attempts} attempts: {message}")]
    TransientNetwork {
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid fetch target: {0}")]
    InvalidTarget(String),

    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns true if retrying the same URL later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::TransientNetwork { .. })
    }
}

/// Errors produced by a single enrichment provider attempt
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider rate limited the request")]
    RateLimited,

    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Provider error: {0}")]
    Api(String),
}

/// Errors surfaced by the fallback executor
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Every provider in the chain spent its retries; carries the last error of each
    #[error("All providers failed: {}", format_failures(.failures))]
    AllProvidersFailed {
        failures: Vec<(String, ProviderError)>,
    },

    #[error("Provider chain is empty")]
    EmptyChain,

    #[error("Enrichment cancelled")]
    Cancelled,
}

fn format_failures(failures: &[(String, ProviderError)]) -> String {
    failures
        .iter()
        .map(|(id, err)| format!("{}: {}", id, err))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Terminal failure of one scheduled job run
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{task} failed after {attempts} attempts: {last_error}")]
    ScheduleExecutionFailed {
        task: state::TaskType,
        attempts: u32,
        last_error: String,
    },

    #[error("{0} is already running")]
    AlreadyRunning(state::TaskType),

    #[error("Scheduler is shut down")]
    ShutDown,
}

/// Result type alias for Trend-Relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{RateState, TaskOutcome, TaskStatus, TaskType};
pub use url::extract_domain;
