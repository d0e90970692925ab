//! Component wiring
//!
//! Builds every collaborator from a validated configuration and hands out
//! the scheduler that drives them.

use crate::alert::{Alerter, LogAlerter, WebhookAlerter};
use crate::config::Config;
use crate::crawler::{build_http_client, user_agent_string, Fetcher, GovernorRegistry};
use crate::enrich::{FallbackExecutor, ProviderChain};
use crate::pipeline::{
    JsonFileDelivery, KeywordMatcher, ListingFilter, PromptSettings, SelectorListingParser, TrendingJob,
};
use crate::robots::RobotsGate;
use crate::schedule::{ScheduleEntry, SchedulerOptions, TaskScheduler};
use crate::state::{RateSettings, RateSnapshot, TaskOutcome, TaskType};
use crate::storage::{open_storage, shared, SharedStorage};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A fully wired relay
pub struct App {
    storage: SharedStorage,
    governors: Arc<GovernorRegistry>,
    fetcher: Arc<Fetcher>,
    scheduler: TaskScheduler,
    cancel: CancellationToken,
}

impl App {
    /// Opens the configured database and wires every component
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_config(config: &Config, cancel: CancellationToken) -> crate::Result<Self> {
        let storage = shared(open_storage(Path::new(&config.output.database_path))?);
        Self::with_storage(config, storage, cancel)
    }

    /// Wires every component around an existing store
    pub fn with_storage(
        config: &Config,
        storage: SharedStorage,
        cancel: CancellationToken,
    ) -> crate::Result<Self> {
        let entries = ScheduleEntry::from_config(&config.scheduler)?;
        storage
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .sync_schedule(&entries)?;

        let collection_client = build_http_client(&config.user_agent, config.fetcher.https_only)?;
        // Providers may sit behind plain-HTTP gateways, so they get their own client
        let provider_client = Client::builder()
            .user_agent(user_agent_string(&config.user_agent))
            .build()?;

        let governors = Arc::new(GovernorRegistry::new(RateSettings::from(&config.rate_limit)));

        let robots = Arc::new(RobotsGate::new(
            collection_client.clone(),
            &config.user_agent.crawler_name,
            &config.robots,
        ));

        let fetcher = Arc::new(Fetcher::new(
            collection_client,
            robots,
            Arc::clone(&governors),
            &config.fetcher,
            cancel.clone(),
        ));

        let chain = Arc::new(ProviderChain::from_config(
            &config.enrichment,
            provider_client.clone(),
        )?);
        tracing::info!("Enrichment chain: {:?}", chain);

        let executor = Arc::new(FallbackExecutor::from_config(
            &config.enrichment,
            Arc::clone(&governors),
            cancel.clone(),
        ));

        let job = TrendingJob::new(
            config.collection.clone(),
            Duration::from_secs(config.fetcher.request_timeout_secs),
            Arc::clone(&fetcher),
            Arc::new(SelectorListingParser::from_config(&config.parser)?),
            ListingFilter::from_config(&config.filters),
            KeywordMatcher::from_config(&config.subscription)?,
            executor,
            chain,
            PromptSettings::from(&config.enrichment),
            Arc::clone(&storage),
            Arc::new(JsonFileDelivery::new(Path::new(&config.output.delivery_dir))),
        );

        let alerter: Arc<dyn Alerter> = match &config.alerting.webhook_url {
            Some(url) => Arc::new(WebhookAlerter::new(
                provider_client,
                url,
                &config.user_agent.crawler_name,
                Duration::from_secs(config.alerting.webhook_timeout_secs),
            )),
            None => Arc::new(LogAlerter),
        };

        let scheduler = TaskScheduler::new(
            Arc::new(job),
            Arc::clone(&storage),
            alerter,
            SchedulerOptions::from_config(&config.scheduler)?,
            cancel.clone(),
        );

        Ok(Self {
            storage,
            governors,
            fetcher,
            scheduler,
            cancel,
        })
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Runs one task now and waits for its outcome
    pub async fn run_once(&self, task: TaskType) -> crate::Result<TaskOutcome> {
        let outcome = self.scheduler.run_now(task).await;
        self.log_pacing();
        self.scheduler.shutdown().await;
        outcome
    }

    /// Runs the calendar until the cancellation token fires
    pub async fn run_daemon(&self) {
        tracing::info!("Scheduler started (offset {})", self.scheduler.offset());
        self.scheduler.run().await;
        self.log_pacing();
    }

    /// Most recent outcomes first
    pub fn history(&self, limit: usize) -> crate::Result<Vec<TaskOutcome>> {
        let outcomes = self
            .storage
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .recent_outcomes(limit)?;
        Ok(outcomes)
    }

    /// Pacing state of every endpoint seen so far
    pub fn pacing(&self) -> Vec<(String, RateSnapshot)> {
        self.governors.snapshots()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn log_pacing(&self) {
        for (key, snapshot) in self.pacing() {
            tracing::debug!(
                "{}: interval {:?}, {:.2} req/s, success ratio {:?}",
                key,
                snapshot.current_interval,
                snapshot.requests_per_second,
                snapshot.success_ratio
            );
        }
        tracing::debug!("Peak concurrent fetches: {}", self.fetcher.peak_in_flight());
    }
}
