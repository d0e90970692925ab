//! HTTP fetcher implementation
//!
//! This module handles every collection request, including:
//! - Building HTTP clients with proper user agent strings
//! - robots.txt gating before any request is made
//! - Per-endpoint pacing through the governor registry
//! - A global in-flight ceiling shared by all endpoints
//! - Retry with exponential backoff for transient failures

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::crawler::governor::{GovernorRegistry, RateGovernor};
use crate::retry::RetryPolicy;
use crate::robots::RobotsGate;
use crate::FetchError;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

/// One request to make
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTarget {
    pub url: Url,
    /// Governor key the request is paced under
    pub endpoint_key: String,
    /// Deadline for a single attempt, body included
    pub deadline: Duration,
}

impl FetchTarget {
    pub fn new(url: Url, endpoint_key: &str, deadline: Duration) -> Self {
        Self {
            url,
            endpoint_key: endpoint_key.to_string(),
            deadline,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `https_only` - Refuse plain-HTTP URLs
///
/// # Example
///
/// ```no_run
/// use trend_relay::config::UserAgentConfig;
/// use trend_relay::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "TrendRelay".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, true).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, https_only: bool) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .https_only(https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Format: CrawlerName/Version (+ContactURL; ContactEmail)
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Classified result of a single HTTP attempt
#[derive(Debug)]
enum AttemptResult {
    Body(String),
    RateLimited,
    Transient(String),
    Status(u16),
}

/// Keeps the in-flight gauge and its high-water mark up to date
struct InFlightGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> InFlightGuard<'a> {
    fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(current, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded-concurrency, robots-aware, adaptively paced HTTP retrieval
///
/// # Request Flow
///
/// 1. Ask the robots gate; a denial returns `RobotsDisallowed` with no request made
/// 2. Apply the origin's crawl delay as the endpoint's pacing floor
/// 3. For each attempt: wait on the governor, take a permit, GET, release the permit
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx | Report success, return body |
/// | HTTP 429 | Report rate limit, retry once the governor allows |
/// | HTTP 5xx, timeout, connect error | Report error, back off exponentially, retry |
/// | Other HTTP 4xx | Report error, fail with `Status` |
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    robots: Arc<RobotsGate>,
    governors: Arc<GovernorRegistry>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Fetcher {
    pub fn new(
        client: Client,
        robots: Arc<RobotsGate>,
        governors: Arc<GovernorRegistry>,
        config: &FetcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            robots,
            governors,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            retry: RetryPolicy::for_fetcher(config),
            cancel,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Requests currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous requests observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Fetches a target, returning the response body
    pub async fn fetch(&self, target: &FetchTarget) -> Result<String, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        if !matches!(target.url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidTarget(format!(
                "unsupported scheme in {}",
                target.url
            )));
        }

        if !self.robots.is_allowed(&target.url).await {
            return Err(FetchError::RobotsDisallowed {
                url: target.url.to_string(),
            });
        }

        let governor = self.governors.governor(&target.endpoint_key);
        if let Some(delay) = self.robots.recommended_delay(&target.url).await {
            governor.apply_floor(delay);
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = self.attempt(&governor, target).await?;

            match result {
                AttemptResult::Body(body) => {
                    governor.report_outcome(true, false);
                    tracing::debug!(
                        "Fetched {} ({} bytes, attempt {})",
                        target.url,
                        body.len(),
                        attempt
                    );
                    return Ok(body);
                }
                AttemptResult::RateLimited => {
                    governor.report_outcome(false, true);
                    if !self.retry.should_retry(attempt) {
                        return Err(FetchError::RateLimited {
                            url: target.url.to_string(),
                            attempts: attempt,
                        });
                    }
                    tracing::warn!("{} rate limited (attempt {})", target.url, attempt);
                }
                AttemptResult::Transient(message) => {
                    governor.report_outcome(false, false);
                    if !self.retry.should_retry(attempt) {
                        return Err(FetchError::TransientNetwork {
                            url: target.url.to_string(),
                            attempts: attempt,
                            message,
                        });
                    }

                    let backoff = self.retry.calculate_backoff(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}): {}, retrying in {:?}",
                        target.url,
                        attempt,
                        message,
                        backoff
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                AttemptResult::Status(status) => {
                    governor.report_outcome(false, false);
                    return Err(FetchError::Status {
                        url: target.url.to_string(),
                        status,
                    });
                }
            }
        }
    }

    /// Paces, takes a permit and performs one GET
    ///
    /// The permit is dropped before this returns, so backoff sleeps never hold it.
    async fn attempt(
        &self,
        governor: &RateGovernor,
        target: &FetchTarget,
    ) -> Result<AttemptResult, FetchError> {
        governor
            .acquire(&self.cancel)
            .await
            .map_err(|_| FetchError::Cancelled)?;

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
            permit = self.permits.acquire() => permit.map_err(|_| FetchError::Cancelled)?,
        };
        let _in_flight = InFlightGuard::enter(&self.in_flight, &self.peak_in_flight);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.get(target) => Ok(result),
        }
    }

    async fn get(&self, target: &FetchTarget) -> AttemptResult {
        let response = match self
            .client
            .get(target.url.clone())
            .timeout(target.deadline)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return AttemptResult::Transient(classify_error(&e)),
        };

        let status = response.status();
        if status.is_success() {
            match response.text().await {
                Ok(body) => AttemptResult::Body(body),
                Err(e) => AttemptResult::Transient(classify_error(&e)),
            }
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            AttemptResult::RateLimited
        } else if status.is_server_error() {
            AttemptResult::Transient(format!("HTTP {}", status.as_u16()))
        } else {
            AttemptResult::Status(status.as_u16())
        }
    }
}

fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
