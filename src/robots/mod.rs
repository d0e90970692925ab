//! Robots.txt handling module
//!
//! `RobotsGate` answers "may this URL be fetched" and "how long should we
//! wait between requests" for any origin, fetching and caching robots.txt on
//! demand. It never fails: an unreachable or broken robots.txt yields a
//! permissive policy.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use crate::config::RobotsConfig;
use crate::url::{origin_key, robots_url};
use reqwest::Client;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Longest robots.txt cache lifetime accepted from configuration (one year)
pub const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Per-origin crawl-policy cache
#[derive(Debug)]
pub struct RobotsGate {
    client: Client,
    product_token: String,
    fetch_timeout: Duration,
    enabled: bool,
    cache: Mutex<RobotsCache>,
}

impl RobotsGate {
    /// Creates a gate that fetches robots.txt through `client`
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client carrying the identifying User-Agent
    /// * `product_token` - Agent name matched against robots.txt groups
    /// * `config` - TTL, timeout, capacity and on/off switch
    pub fn new(client: Client, product_token: &str, config: &RobotsConfig) -> Self {
        let ttl = cache_ttl(config.cache_ttl_secs);

        Self {
            client,
            product_token: product_token.to_string(),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            enabled: config.enabled,
            cache: Mutex::new(RobotsCache::new(config.cache_capacity, ttl)),
        }
    }

    /// Age after which a cached policy is refetched
    pub fn cache_ttl(&self) -> chrono::Duration {
        self.cache.lock().map(|cache| cache.ttl()).unwrap_or_else(|p| p.into_inner().ttl())
    }

    /// Returns true if the gate consults robots.txt at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks whether `url` may be fetched by this agent
    pub async fn is_allowed(&self, url: &Url) -> bool {
        if !self.enabled {
            return true;
        }

        let policy = self.policy_for(url).await;
        let allowed = policy.is_allowed(url.as_str(), &self.product_token);
        if !allowed {
            tracing::info!("robots.txt disallows {}", url);
        }
        allowed
    }

    /// Returns the crawl delay the origin of `url` asks for, if any
    pub async fn recommended_delay(&self, url: &Url) -> Option<Duration> {
        if !self.enabled {
            return None;
        }

        self.policy_for(url).await.crawl_delay(&self.product_token)
    }

    /// Number of cached origins
    pub fn cached_origins(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    async fn policy_for(&self, url: &Url) -> ParsedRobots {
        let Some(origin) = origin_key(url) else {
            return ParsedRobots::allow_all();
        };

        if let Ok(cache) = self.cache.lock() {
            if let Some(cached) = cache.get_fresh(&origin) {
                return cached.content.clone();
            }
        }

        let policy = self.fetch_policy(url).await;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(&origin, CachedRobots::new(policy.clone()));
        }

        policy
    }

    /// Retrieves and parses robots.txt for the origin of `url`
    ///
    /// 2xx is parsed, 4xx means no policy, anything else is permissive.
    async fn fetch_policy(&self, url: &Url) -> ParsedRobots {
        let Some(target) = robots_url(url) else {
            return ParsedRobots::allow_all();
        };

        tracing::debug!("Fetching {}", target);

        let response = match self
            .client
            .get(target.clone())
            .timeout(self.fetch_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}, allowing all", target, e);
                return ParsedRobots::allow_all();
            }
        };

        let status = response.status();
        if status.is_success() {
            match response.text().await {
                Ok(body) => ParsedRobots::from_content(&body),
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}, allowing all", target, e);
                    ParsedRobots::allow_all()
                }
            }
        } else if status.is_client_error() {
            tracing::debug!("{} returned {}, no policy", target, status);
            ParsedRobots::allow_all()
        } else {
            tracing::warn!("{} returned {}, allowing all", target, status);
            ParsedRobots::allow_all()
        }
    }
}

fn cache_ttl(secs: u64) -> chrono::Duration {
    let secs = secs.min(MAX_CACHE_TTL_SECS) as i64;
    chrono::Duration::try_seconds(secs).unwrap_or_else(|| chrono::Duration::days(365))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config(cache_ttl_secs: u64) -> RobotsConfig {
        RobotsConfig {
            enabled: true,
            cache_ttl_secs,
            fetch_timeout_secs: 5,
            cache_capacity: 8,
        }
    }

    #[test]
    fn test_cache_ttl_from_config() {
        let gate = RobotsGate::new(Client::new(), "TestRelay", &create_test_config(3600));
        assert_eq!(gate.cache_ttl(), chrono::Duration::hours(1));
    }

    #[test]
    fn test_huge_cache_ttl_is_clamped() {
        let gate = RobotsGate::new(
            Client::new(),
            "TestRelay",
            &create_test_config(10_000_000_000_000_000),
        );
        assert_eq!(gate.cache_ttl(), chrono::Duration::days(365));

        let gate = RobotsGate::new(Client::new(), "TestRelay", &create_test_config(u64::MAX));
        assert_eq!(gate.cache_ttl(), chrono::Duration::days(365));
    }
}
