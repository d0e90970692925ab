//! The collection job run by the scheduler
//!
//! One execution fetches the listing page for a task type, extracts and
//! filters listings, drops those already delivered, enriches the rest through
//! the provider chain and hands the result to the delivery sink.

use crate::config::{CollectionConfig, EnrichmentConfig};
use crate::crawler::{FetchTarget, Fetcher};
use crate::enrich::{EnrichmentRequest, FallbackExecutor, ProviderChain};
use crate::pipeline::delivery::Delivery;
use crate::pipeline::filters::{KeywordMatcher, ListingFilter};
use crate::pipeline::listing::{EnrichedListing, Listing};
use crate::pipeline::parser::ListingParser;
use crate::schedule::{CollectionJob, JobReport};
use crate::state::TaskType;
use crate::storage::SharedStorage;
use crate::url::expand_template;
use crate::{EnrichError, FetchError, RelayError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Prompt settings shared by every enrichment of a run
#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub enabled: bool,
    pub template: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl From<&EnrichmentConfig> for PromptSettings {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            enabled: config.enabled,
            template: config.prompt_template.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Fills `{name}`, `{description}`, `{language}`, `{stars}` and `{url}`
pub fn render_prompt(template: &str, listing: &Listing) -> String {
    let stars = listing
        .stars
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    template
        .replace("{name}", &listing.name)
        .replace("{description}", listing.description.as_deref().unwrap_or("none"))
        .replace("{language}", listing.language.as_deref().unwrap_or("unknown"))
        .replace("{stars}", &stars)
        .replace("{url}", &listing.url)
}

/// Collects, filters, enriches and delivers trending listings
pub struct TrendingJob {
    collection: CollectionConfig,
    request_timeout: Duration,
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn ListingParser>,
    filter: ListingFilter,
    keywords: KeywordMatcher,
    executor: Arc<FallbackExecutor>,
    chain: Arc<ProviderChain>,
    prompt: PromptSettings,
    storage: SharedStorage,
    delivery: Arc<dyn Delivery>,
}

impl TrendingJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collection: CollectionConfig,
        request_timeout: Duration,
        fetcher: Arc<Fetcher>,
        parser: Arc<dyn ListingParser>,
        filter: ListingFilter,
        keywords: KeywordMatcher,
        executor: Arc<FallbackExecutor>,
        chain: Arc<ProviderChain>,
        prompt: PromptSettings,
        storage: SharedStorage,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            collection,
            request_timeout,
            fetcher,
            parser,
            filter,
            keywords,
            executor,
            chain,
            prompt,
            storage,
            delivery,
        }
    }

    async fn collect(&self, task: TaskType) -> crate::Result<Vec<Listing>> {
        let url = expand_template(&self.collection.url_template, task)?;
        let target = FetchTarget::new(url, &self.collection.endpoint_key, self.request_timeout);

        let body = self.fetcher.fetch(&target).await.map_err(|e| match e {
            FetchError::Cancelled => RelayError::Cancelled,
            other => RelayError::Fetch(other),
        })?;

        let listings = self.parser.parse(&body, &target.url);
        if listings.is_empty() {
            tracing::warn!("No {} listings found at {}", task, target.url);
        }
        Ok(listings)
    }

    /// Drops repeats within the page and listings already delivered for `task`
    fn drop_seen(&self, task: TaskType, listings: Vec<Listing>) -> crate::Result<Vec<Listing>> {
        let mut on_page = HashSet::new();
        let unique: Vec<_> = listings
            .into_iter()
            .filter(|l| on_page.insert(l.name.clone()))
            .collect();

        let names: Vec<_> = unique.iter().map(|l| l.name.clone()).collect();
        let seen = self
            .storage
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .seen_names(task, &names)?;

        if !seen.is_empty() {
            tracing::info!("Skipping {} {} listings already delivered", seen.len(), task);
        }
        Ok(unique.into_iter().filter(|l| !seen.contains(&l.name)).collect())
    }

    /// Enriches every listing concurrently; returns the set and the fallback count
    async fn enrich(&self, listings: Vec<Listing>) -> crate::Result<(Vec<EnrichedListing>, usize)> {
        if !self.prompt.enabled || self.chain.is_empty() {
            tracing::debug!("Enrichment off, using descriptions as summaries");
            return Ok((listings.into_iter().map(EnrichedListing::fallback).collect(), 0));
        }

        let handles: Vec<_> = listings
            .iter()
            .map(|listing| {
                let executor = Arc::clone(&self.executor);
                let chain = Arc::clone(&self.chain);
                let request = EnrichmentRequest {
                    subject: listing.name.clone(),
                    prompt: render_prompt(&self.prompt.template, listing),
                    max_tokens: self.prompt.max_tokens,
                    temperature: self.prompt.temperature,
                };
                tokio::spawn(async move { executor.run(&chain, &request).await })
            })
            .collect();

        let mut enriched = Vec::with_capacity(listings.len());
        let mut failures = 0usize;

        for (listing, handle) in listings.into_iter().zip(handles) {
            match handle.await {
                Ok(Ok(response)) => {
                    let summary = response.content.trim().to_string();
                    enriched.push(EnrichedListing::enriched(listing, summary, &response.provider_id));
                }
                Ok(Err(EnrichError::Cancelled)) => return Err(RelayError::Cancelled),
                Ok(Err(e)) => {
                    tracing::warn!("{}: {}; using fallback summary", listing.name, e);
                    failures += 1;
                    enriched.push(EnrichedListing::fallback(listing));
                }
                Err(e) => {
                    tracing::error!("Enrichment task for {} ended abnormally: {}", listing.name, e);
                    failures += 1;
                    enriched.push(EnrichedListing::fallback(listing));
                }
            }
        }

        Ok((enriched, failures))
    }
}

#[async_trait]
impl CollectionJob for TrendingJob {
    async fn execute(&self, task: TaskType, cancel: &CancellationToken) -> crate::Result<JobReport> {
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }

        let listings = self.collect(task).await?;
        let items_found = listings.len();
        if items_found == 0 {
            return Ok(JobReport::default());
        }
        tracing::info!("Collected {} {} listings", items_found, task);

        let kept = self.keywords.apply(self.filter.apply(listings, task));
        let fresh = self.drop_seen(task, kept)?;

        if fresh.is_empty() {
            tracing::info!("No new {} listings to deliver", task);
            return Ok(JobReport {
                items_found,
                items_kept: 0,
                enrichment_failures: 0,
            });
        }

        let (enriched, enrichment_failures) = self.enrich(fresh).await?;

        self.delivery.deliver(task, &enriched).await?;

        let names: Vec<_> = enriched.iter().map(|l| l.listing.name.clone()).collect();
        self.storage
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .mark_seen(task, &names)?;

        Ok(JobReport {
            items_found,
            items_kept: enriched.len(),
            enrichment_failures,
        })
    }
}
