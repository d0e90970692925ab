//! Adaptive per-endpoint pacing
//!
//! Each endpoint key gets one `RateGovernor`. Acquirers for the same key queue
//! on a fair async mutex, so they are released in arrival order and at most
//! one of them sleeps on the interval at a time. Outcome reports only touch
//! the state lock and never wait behind a sleeping acquirer.

use crate::state::{RateSettings, RateSnapshot, RateState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Returned when a pacing wait is interrupted by shutdown
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("pacing wait cancelled")]
pub struct Cancelled;

/// Pacing state machine for one endpoint
#[derive(Debug)]
pub struct RateGovernor {
    key: String,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<RateState>,
}

impl RateGovernor {
    pub fn new(key: &str, settings: RateSettings) -> Self {
        Self {
            key: key.to_string(),
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(RateState::new(settings)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Waits until the endpoint's interval has elapsed, then records the call
    ///
    /// The first call on a fresh endpoint returns immediately.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let _turn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            guard = self.gate.lock() => guard,
        };

        loop {
            let wait = self.lock_state().time_until_ready(now());
            let Some(wait) = wait else {
                break;
            };

            tracing::trace!("{}: waiting {:?} before next call", self.key, wait);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        self.lock_state().record_call(now());
        Ok(())
    }

    /// Feeds the result of a call back into the interval
    pub fn report_outcome(&self, success: bool, is_rate_limited: bool) {
        let mut state = self.lock_state();
        if success {
            state.record_success(now());
        } else {
            state.record_error(is_rate_limited, now());
        }
    }

    /// Raises the endpoint's minimum interval
    pub fn apply_floor(&self, floor: Duration) {
        let mut state = self.lock_state();
        if floor > state.min_interval() {
            tracing::info!("{}: honouring crawl delay of {:?}", self.key, floor);
            state.apply_floor(floor);
        }
    }

    pub fn current_interval(&self) -> Duration {
        self.lock_state().current_interval()
    }

    pub fn snapshot(&self) -> RateSnapshot {
        self.lock_state().snapshot()
    }

    // Pacing state stays consistent even if a holder panicked
    fn lock_state(&self) -> MutexGuard<'_, RateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Lazily creates one governor per endpoint key
#[derive(Debug)]
pub struct GovernorRegistry {
    settings: RateSettings,
    governors: Mutex<HashMap<String, Arc<RateGovernor>>>,
}

impl GovernorRegistry {
    pub fn new(settings: RateSettings) -> Self {
        Self {
            settings,
            governors: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the governor for `key`, creating it on first use
    pub fn governor(&self, key: &str) -> Arc<RateGovernor> {
        let mut governors = self
            .governors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        governors
            .entry(key.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating rate governor for {}", key);
                Arc::new(RateGovernor::new(key, self.settings.clone()))
            })
            .clone()
    }

    pub async fn acquire(&self, key: &str, cancel: &CancellationToken) -> Result<(), Cancelled> {
        self.governor(key).acquire(cancel).await
    }

    pub fn report_outcome(&self, key: &str, success: bool, is_rate_limited: bool) {
        self.governor(key).report_outcome(success, is_rate_limited);
    }

    /// Snapshots of every known endpoint, sorted by key
    pub fn snapshots(&self) -> Vec<(String, RateSnapshot)> {
        let governors: Vec<Arc<RateGovernor>> = self
            .governors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();

        let mut snapshots: Vec<_> = governors
            .iter()
            .map(|g| (g.key().to_string(), g.snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }
}
