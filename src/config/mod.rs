//! Configuration module for Trend-Relay
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use trend_relay::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("relay.toml")).unwrap();
//! println!("Fetch concurrency: {}", config.fetcher.max_concurrent);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AlertingConfig, CollectionConfig, Config, EnrichmentConfig, FetcherConfig, FilterConfig,
    MatchField, MatchMode, OutputConfig, ParserConfig, PeriodStarsConfig, ProviderConfig,
    RateLimitConfig, RobotsConfig, ScheduleEntryConfig, SchedulerConfig, SubscriptionConfig,
    UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
