use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Tuning knobs for adaptive pacing of one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RateSettings {
    /// Interval used before any feedback has been received
    pub initial_interval: Duration,

    /// Lower bound for the interval
    pub min_interval: Duration,

    /// Upper bound for the interval
    pub max_interval: Duration,

    /// Consecutive successes needed before speeding up
    pub success_threshold: u32,

    /// Multiplier applied on speed-up (< 1.0)
    pub speedup_factor: f64,

    /// Multiplier applied after plain errors (> 1.0)
    pub error_factor: f64,

    /// Multiplier applied on an explicit rate-limit signal (> 1.0)
    pub rate_limit_factor: f64,

    /// Consecutive plain errors needed before slowing down
    pub errors_before_backoff: u32,

    /// Number of outcomes kept for statistics
    pub history_size: usize,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            min_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            success_threshold: 10,
            speedup_factor: 0.9,
            error_factor: 1.5,
            rate_limit_factor: 2.0,
            errors_before_backoff: 1,
            history_size: 100,
        }
    }
}

impl From<&RateLimitConfig> for RateSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            min_interval: Duration::from_millis(config.min_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            success_threshold: config.success_threshold,
            speedup_factor: config.speedup_factor,
            error_factor: config.error_factor,
            rate_limit_factor: config.rate_limit_factor,
            errors_before_backoff: config.errors_before_backoff,
            history_size: config.history_size,
        }
    }
}

/// Kind of feedback reported after a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Error,
    RateLimited,
}

/// Point-in-time statistics for one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    pub current_interval: Duration,
    pub requests_per_second: f64,
    pub recent_successes: usize,
    pub recent_errors: usize,
    /// Share of successes in the history window, `None` before any outcome
    pub success_ratio: Option<f64>,
}

/// Adaptive pacing state for a single endpoint
///
/// The interval shrinks multiplicatively after a run of successes and grows
/// after errors, faster for explicit rate-limit signals. The interval always
/// stays within `[min_interval, max_interval]`.
#[derive(Debug, Clone)]
pub struct RateState {
    settings: RateSettings,
    current_interval: Duration,
    consecutive_successes: u32,
    consecutive_errors: u32,
    history: VecDeque<(CallOutcome, Instant)>,
    last_call: Option<Instant>,
}

impl RateState {
    /// Creates a new state with the interval clamped into bounds
    pub fn new(settings: RateSettings) -> Self {
        let current_interval = clamp(
            settings.initial_interval,
            settings.min_interval,
            settings.max_interval,
        );
        let history = VecDeque::with_capacity(settings.history_size);

        Self {
            settings,
            current_interval,
            consecutive_successes: 0,
            consecutive_errors: 0,
            history,
            last_call: None,
        }
    }

    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    pub fn min_interval(&self) -> Duration {
        self.settings.min_interval
    }

    pub fn max_interval(&self) -> Duration {
        self.settings.max_interval
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn last_call(&self) -> Option<Instant> {
        self.last_call
    }

    /// Checks if a call may be issued at `now`
    pub fn can_request(&self, now: Instant) -> bool {
        self.time_until_ready(now).is_none()
    }

    /// Calculates the time until the next call may be issued
    ///
    /// Returns None if a call can be made now. The first call never waits.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        let last = self.last_call?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.current_interval {
            Some(self.current_interval - elapsed)
        } else {
            None
        }
    }

    /// Records that a call was issued
    pub fn record_call(&mut self, now: Instant) {
        self.last_call = Some(now);
    }

    /// Records a successful call, speeding up once the threshold is crossed
    pub fn record_success(&mut self, now: Instant) {
        self.push_history(CallOutcome::Success, now);
        self.consecutive_errors = 0;
        self.consecutive_successes += 1;

        if self.consecutive_successes >= self.settings.success_threshold {
            self.scale(self.settings.speedup_factor);
            self.consecutive_successes = 0;
            tracing::debug!(
                "Interval decreased to {:.2}s (faster)",
                self.current_interval.as_secs_f64()
            );
        }
    }

    /// Records a failed call
    ///
    /// Rate-limit signals back off immediately and discard any accumulated
    /// success streak. Plain errors back off once `errors_before_backoff`
    /// consecutive errors have been seen.
    pub fn record_error(&mut self, rate_limited: bool, now: Instant) {
        if rate_limited {
            self.push_history(CallOutcome::RateLimited, now);
            self.scale(self.settings.rate_limit_factor);
            self.consecutive_successes = 0;
            self.consecutive_errors = 0;
            tracing::warn!(
                "Rate limit hit, interval increased to {:.2}s",
                self.current_interval.as_secs_f64()
            );
            return;
        }

        self.push_history(CallOutcome::Error, now);
        self.consecutive_errors += 1;

        if self.consecutive_errors >= self.settings.errors_before_backoff {
            self.scale(self.settings.error_factor);
            self.consecutive_errors = 0;
            tracing::debug!(
                "Errors detected, interval increased to {:.2}s",
                self.current_interval.as_secs_f64()
            );
        }
    }

    /// Raises the lower bound, e.g. to honour a robots.txt crawl delay
    ///
    /// The floor never exceeds `max_interval`.
    pub fn apply_floor(&mut self, floor: Duration) {
        let floor = floor.min(self.settings.max_interval);
        if floor > self.settings.min_interval {
            self.settings.min_interval = floor;
        }
        self.current_interval = clamp(
            self.current_interval,
            self.settings.min_interval,
            self.settings.max_interval,
        );
    }

    /// Summarizes the outcome history
    pub fn snapshot(&self) -> RateSnapshot {
        let recent_successes = self
            .history
            .iter()
            .filter(|(outcome, _)| *outcome == CallOutcome::Success)
            .count();
        let recent_errors = self.history.len() - recent_successes;
        let success_ratio = if self.history.is_empty() {
            None
        } else {
            Some(recent_successes as f64 / self.history.len() as f64)
        };
        let secs = self.current_interval.as_secs_f64();

        RateSnapshot {
            current_interval: self.current_interval,
            requests_per_second: if secs > 0.0 { 1.0 / secs } else { f64::INFINITY },
            recent_successes,
            recent_errors,
            success_ratio,
        }
    }

    fn scale(&mut self, factor: f64) {
        let scaled = self.current_interval.mul_f64(factor);
        self.current_interval = clamp(
            scaled,
            self.settings.min_interval,
            self.settings.max_interval,
        );
    }

    fn push_history(&mut self, outcome: CallOutcome, now: Instant) {
        if self.settings.history_size == 0 {
            return;
        }
        if self.history.len() == self.settings.history_size {
            self.history.pop_front();
        }
        self.history.push_back((outcome, now));
    }
}

fn clamp(value: Duration, min: Duration, max: Duration) -> Duration {
    value.max(min).min(max)
}
