//! Ordered multi-provider execution
//!
//! Providers are tried in chain order. Each gets `1 + max_retries` attempts,
//! every attempt bounded by a timeout and separated by jittered exponential
//! backoff. The first success wins and later providers are never called.

use crate::config::EnrichmentConfig;
use crate::crawler::GovernorRegistry;
use crate::enrich::provider::{EnrichmentRequest, EnrichmentResponse, Provider, ProviderChain};
use crate::retry::RetryPolicy;
use crate::{EnrichError, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Governor key for a provider
pub fn provider_key(id: &str) -> String {
    format!("provider:{}", id)
}

/// Runs enrichment requests against a provider chain
#[derive(Debug)]
pub struct FallbackExecutor {
    permits: Arc<Semaphore>,
    governors: Arc<GovernorRegistry>,
    retry: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
}

impl FallbackExecutor {
    pub fn new(
        governors: Arc<GovernorRegistry>,
        retry: RetryPolicy,
        timeout: Duration,
        max_concurrent: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            governors,
            retry,
            timeout,
            cancel,
        }
    }

    pub fn from_config(
        config: &EnrichmentConfig,
        governors: Arc<GovernorRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self::new(
            governors,
            RetryPolicy::for_enrichment(config),
            Duration::from_secs(config.timeout_secs),
            config.max_concurrent,
            cancel,
        )
    }

    /// Returns the first successful response in chain order
    pub async fn run(
        &self,
        chain: &ProviderChain,
        request: &EnrichmentRequest,
    ) -> Result<EnrichmentResponse, EnrichError> {
        if chain.is_empty() {
            return Err(EnrichError::EmptyChain);
        }

        let mut failures = Vec::with_capacity(chain.len());

        for (ordinal, provider) in chain.providers().iter().enumerate() {
            match self.run_provider(provider.as_ref(), request).await? {
                Ok(response) => {
                    if ordinal > 0 {
                        tracing::info!(
                            "{}: answered by fallback provider '{}'",
                            request.subject,
                            response.provider_id
                        );
                    }
                    return Ok(response);
                }
                Err(last) => {
                    tracing::warn!(
                        "{}: provider '{}' exhausted: {}",
                        request.subject,
                        provider.id(),
                        last
                    );
                    failures.push((provider.id().to_string(), last));
                }
            }
        }

        Err(EnrichError::AllProvidersFailed { failures })
    }

    /// Attempts one provider until success or its retries run out
    ///
    /// The outer error is cancellation; the inner error is the provider's last failure.
    async fn run_provider(
        &self,
        provider: &dyn Provider,
        request: &EnrichmentRequest,
    ) -> Result<Result<EnrichmentResponse, ProviderError>, EnrichError> {
        let governor = self.governors.governor(&provider_key(provider.id()));
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            governor
                .acquire(&self.cancel)
                .await
                .map_err(|_| EnrichError::Cancelled)?;

            let result = {
                let _permit = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(EnrichError::Cancelled),
                    permit = self.permits.acquire() => permit.map_err(|_| EnrichError::Cancelled)?,
                };

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(EnrichError::Cancelled),
                    result = tokio::time::timeout(self.timeout, provider.call(request)) => {
                        result.unwrap_or(Err(ProviderError::Timeout(self.timeout)))
                    }
                }
            };

            let err = match result {
                Ok(content) => {
                    governor.report_outcome(true, false);
                    return Ok(Ok(EnrichmentResponse {
                        provider_id: provider.id().to_string(),
                        content,
                        attempts: attempt,
                    }));
                }
                Err(err) => err,
            };

            governor.report_outcome(false, err == ProviderError::RateLimited);

            if !self.retry.should_retry(attempt) {
                return Ok(Err(err));
            }

            let backoff = self.retry.calculate_backoff(attempt);
            tracing::debug!(
                "{}: provider '{}' attempt {} failed: {}, retrying in {:?}",
                request.subject,
                provider.id(),
                attempt,
                err,
                backoff
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(EnrichError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}
