//! Exponential backoff shared by the fetcher, the fallback executor and the
//! scheduler's job retries.

use crate::config::{EnrichmentConfig, FetcherConfig, SchedulerConfig};
use std::time::Duration;

/// Retry budget and backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for a single delay, before jitter
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Jitter band as a fraction of the computed delay (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Policy for collection fetches: doubling from the base, no jitter
    pub fn for_fetcher(config: &FetcherConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.backoff_base_ms),
            max_backoff: Duration::from_millis(config.backoff_cap_ms),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Policy for provider calls: doubling with a jitter band
    pub fn for_enrichment(config: &EnrichmentConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.backoff_base_ms),
            max_backoff: Duration::from_millis(config.backoff_cap_ms),
            backoff_multiplier: 2.0,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Policy for whole job re-runs
    pub fn for_jobs(config: &SchedulerConfig) -> Self {
        let initial = Duration::from_secs(config.retry_delay_secs);
        Self {
            max_retries: config.max_retries,
            initial_backoff: initial,
            max_backoff: initial.saturating_mul(16),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Returns true if another attempt may follow attempt number `attempt` (1-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());

        let jitter_range = capped * self.jitter_factor;
        let final_backoff = if jitter_range > 0.0 {
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_backoff)
    }
}
