use crate::config::types::{
    CollectionConfig, Config, EnrichmentConfig, FetcherConfig, OutputConfig, ParserConfig,
    MatchMode, RateLimitConfig, RobotsConfig, ScheduleEntryConfig, SchedulerConfig,
    SubscriptionConfig, UserAgentConfig,
};
use crate::robots::MAX_CACHE_TTL_SECS;
use crate::schedule::{parse_time_of_day, parse_utc_offset, parse_weekday};
use crate::ConfigError;
use regex::RegexBuilder;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_robots_config(&config.robots)?;
    validate_collection_config(&config.collection)?;
    validate_parser_config(&config.parser)?;
    validate_subscription_config(&config.subscription)?;
    validate_enrichment_config(&config.enrichment)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_output_config(&config.output)?;

    if let Some(webhook) = &config.alerting.webhook_url {
        Url::parse(webhook)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webhook-url: {}", e)))?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Name doubles as the robots.txt product token
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters, '-' and '_', got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 || config.max_concurrent > 100 {
        return Err(ConfigError::Validation(format!(
            "fetcher max-concurrent must be between 1 and 100, got {}",
            config.max_concurrent
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetcher request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.backoff_base_ms > config.backoff_cap_ms {
        return Err(ConfigError::Validation(format!(
            "fetcher backoff-base-ms ({}) exceeds backoff-cap-ms ({})",
            config.backoff_base_ms, config.backoff_cap_ms
        )));
    }

    Ok(())
}

fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.min_interval_ms > config.max_interval_ms {
        return Err(ConfigError::Validation(format!(
            "min-interval-ms ({}) must not exceed max-interval-ms ({})",
            config.min_interval_ms, config.max_interval_ms
        )));
    }

    if config.success_threshold < 1 {
        return Err(ConfigError::Validation(
            "success-threshold must be >= 1".to_string(),
        ));
    }

    if config.errors_before_backoff < 1 {
        return Err(ConfigError::Validation(
            "errors-before-backoff must be >= 1".to_string(),
        ));
    }

    if !(config.speedup_factor > 0.0 && config.speedup_factor < 1.0) {
        return Err(ConfigError::Validation(format!(
            "speedup-factor must be in (0, 1), got {}",
            config.speedup_factor
        )));
    }

    for (name, factor) in [
        ("error-factor", config.error_factor),
        ("rate-limit-factor", config.rate_limit_factor),
    ] {
        if !(factor > 1.0 && factor.is_finite()) {
            return Err(ConfigError::Validation(format!(
                "{} must be > 1, got {}",
                name, factor
            )));
        }
    }

    Ok(())
}

fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.enabled && config.cache_capacity == 0 {
        return Err(ConfigError::Validation(
            "robots cache-capacity must be >= 1".to_string(),
        ));
    }

    if config.fetch_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "robots fetch-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.cache_ttl_secs > MAX_CACHE_TTL_SECS {
        return Err(ConfigError::Validation(format!(
            "robots cache-ttl-secs must be <= {} (one year)",
            MAX_CACHE_TTL_SECS
        )));
    }

    Ok(())
}

fn validate_collection_config(config: &CollectionConfig) -> Result<(), ConfigError> {
    let sample = config.url_template.replace("{range}", "daily");
    let url = Url::parse(&sample).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid url-template '{}': {}",
            config.url_template, e
        ))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "url-template '{}' must use http or https",
            config.url_template
        )));
    }

    if config.endpoint_key.trim().is_empty() {
        return Err(ConfigError::Validation(
            "collection endpoint-key cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    let optional = [
        &config.description,
        &config.language,
        &config.stars,
        &config.period_stars,
    ];

    for selector in [Some(&config.item), Some(&config.name)]
        .into_iter()
        .chain(optional.into_iter().map(|s| s.as_ref()))
        .flatten()
    {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e))
        })?;
    }

    Ok(())
}

fn validate_subscription_config(config: &SubscriptionConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.fuzzy_threshold) {
        return Err(ConfigError::Validation(format!(
            "fuzzy-threshold must be in [0, 1], got {}",
            config.fuzzy_threshold
        )));
    }

    if config.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "subscription keywords cannot be empty".to_string(),
        ));
    }

    if !config.keywords.is_empty() && config.match_fields.is_empty() {
        return Err(ConfigError::Validation(
            "subscription match-fields cannot be empty when keywords are set".to_string(),
        ));
    }

    if config.match_mode == MatchMode::Regex {
        for keyword in &config.keywords {
            RegexBuilder::new(keyword)
                .case_insensitive(!config.case_sensitive)
                .build()
                .map_err(|e| {
                    ConfigError::Validation(format!("Invalid keyword pattern '{}': {}", keyword, e))
                })?;
        }
    }

    Ok(())
}

fn validate_enrichment_config(config: &EnrichmentConfig) -> Result<(), ConfigError> {
    if config.max_concurrent < 1 {
        return Err(ConfigError::Validation(
            "enrichment max-concurrent must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "enrichment timeout-secs must be >= 1".to_string(),
        ));
    }

    if !(0.0..1.0).contains(&config.jitter_factor) {
        return Err(ConfigError::Validation(format!(
            "jitter-factor must be in [0, 1), got {}",
            config.jitter_factor
        )));
    }

    let mut ids = HashSet::new();
    for provider in &config.providers {
        if !ids.insert(provider.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate provider id '{}'",
                provider.id
            )));
        }

        Url::parse(&provider.base_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid base-url for provider '{}': {}",
                provider.id, e
            ))
        })?;

        if provider.model.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Provider '{}' must name a model",
                provider.id
            )));
        }
    }

    for id in &config.chain {
        if !ids.contains(id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Chain references unknown provider '{}'",
                id
            )));
        }
    }

    if config.enabled && config.chain.is_empty() && !config.providers.is_empty() {
        tracing::debug!("Enrichment chain not set, providers will be tried in declaration order");
    }

    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if parse_utc_offset(&config.utc_offset).is_none() {
        return Err(ConfigError::InvalidSchedule(format!(
            "utc-offset must look like '+08:00', got '{}'",
            config.utc_offset
        )));
    }

    if config.tick_secs == 0 {
        return Err(ConfigError::Validation(
            "scheduler tick-secs must be >= 1".to_string(),
        ));
    }

    if config.workers < 1 || config.queue_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "scheduler workers ({}) and queue-capacity ({}) must be >= 1",
            config.workers, config.queue_capacity
        )));
    }

    validate_entry("daily", &config.daily)?;
    validate_entry("weekly", &config.weekly)?;
    validate_entry("monthly", &config.monthly)?;

    if config.weekly.weekday.is_none() {
        return Err(ConfigError::InvalidSchedule(
            "weekly entry requires a weekday".to_string(),
        ));
    }

    Ok(())
}

fn validate_entry(name: &str, entry: &ScheduleEntryConfig) -> Result<(), ConfigError> {
    if parse_time_of_day(&entry.time).is_none() {
        return Err(ConfigError::InvalidSchedule(format!(
            "{} time must be HH:MM, got '{}'",
            name, entry.time
        )));
    }

    if let Some(day) = &entry.weekday {
        if parse_weekday(day).is_none() {
            return Err(ConfigError::InvalidSchedule(format!(
                "{} weekday '{}' is not a day of the week",
                name, day
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.delivery_dir.is_empty() {
        return Err(ConfigError::Validation(
            "delivery_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
