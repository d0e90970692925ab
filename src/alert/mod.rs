//! Operator alerting
//!
//! The scheduler raises one alert per run that exhausts its retries. Alert
//! delivery failures are reported back to the caller, which logs them and
//! carries on.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Severity attached to an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while delivering an alert
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Alert webhook returned HTTP {0}")]
    Status(u16),
}

/// Sink for operator alerts
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn notify(&self, level: AlertLevel, message: &str) -> Result<(), AlertError>;
}

/// Writes alerts to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn notify(&self, level: AlertLevel, message: &str) -> Result<(), AlertError> {
        match level {
            AlertLevel::Info => tracing::info!("ALERT [{}] {}", level, message),
            AlertLevel::Warning => tracing::warn!("ALERT [{}] {}", level, message),
            AlertLevel::Error | AlertLevel::Critical => {
                tracing::error!("ALERT [{}] {}", level, message)
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    source: &'a str,
    level: AlertLevel,
    message: &'a str,
    timestamp: String,
}

/// Posts alerts as JSON to a webhook, and logs them too
#[derive(Debug, Clone)]
pub struct WebhookAlerter {
    client: Client,
    url: String,
    source: String,
    timeout: Duration,
}

impl WebhookAlerter {
    /// # Arguments
    ///
    /// * `client` - HTTP client to post with
    /// * `url` - Webhook receiving `{source, level, message, timestamp}`
    /// * `source` - Name identifying this process in the payload
    /// * `timeout` - Deadline for one delivery
    pub fn new(client: Client, url: &str, source: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: url.to_string(),
            source: source.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn notify(&self, level: AlertLevel, message: &str) -> Result<(), AlertError> {
        LogAlerter.notify(level, message).await?;

        let payload = WebhookPayload {
            source: &self.source,
            level,
            message,
            timestamp: Utc::now().to_rfc3339(),
        };

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Status(status.as_u16()));
        }

        tracing::debug!("Alert delivered to webhook");
        Ok(())
    }
}
