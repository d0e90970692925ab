use serde::Deserialize;

/// Main configuration structure for Trend-Relay
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    pub collection: CollectionConfig,
    pub parser: ParserConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    pub output: OutputConfig,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the collector, also used as the robots.txt product token
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the collector
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the collector
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for collector-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// HTTP retrieval settings for the collection fetcher
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Maximum number of in-flight requests across all endpoints
    #[serde(rename = "max-concurrent", default = "default_fetch_concurrency")]
    pub max_concurrent: usize,

    /// Per-request deadline (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(rename = "max-retries", default = "default_fetch_retries")]
    pub max_retries: u32,

    /// First backoff delay after a transient failure (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound for any backoff delay (milliseconds)
    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,

    /// Refuse plain-HTTP targets
    #[serde(rename = "https-only", default)]
    pub https_only: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_fetch_concurrency(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_fetch_retries(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            https_only: false,
        }
    }
}

/// Adaptive pacing settings shared by every endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(rename = "initial-interval-ms", default = "default_initial_interval")]
    pub initial_interval_ms: u64,

    #[serde(rename = "min-interval-ms", default = "default_min_interval")]
    pub min_interval_ms: u64,

    #[serde(rename = "max-interval-ms", default = "default_max_interval")]
    pub max_interval_ms: u64,

    /// Consecutive successes before the interval shrinks
    #[serde(rename = "success-threshold", default = "default_success_threshold")]
    pub success_threshold: u32,

    #[serde(rename = "speedup-factor", default = "default_speedup_factor")]
    pub speedup_factor: f64,

    #[serde(rename = "error-factor", default = "default_error_factor")]
    pub error_factor: f64,

    #[serde(rename = "rate-limit-factor", default = "default_rate_limit_factor")]
    pub rate_limit_factor: f64,

    /// Consecutive plain errors before the interval grows
    #[serde(rename = "errors-before-backoff", default = "default_errors_before_backoff")]
    pub errors_before_backoff: u32,

    #[serde(rename = "history-size", default = "default_history_size")]
    pub history_size: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval(),
            min_interval_ms: default_min_interval(),
            max_interval_ms: default_max_interval(),
            success_threshold: default_success_threshold(),
            speedup_factor: default_speedup_factor(),
            error_factor: default_error_factor(),
            rate_limit_factor: default_rate_limit_factor(),
            errors_before_backoff: default_errors_before_backoff(),
            history_size: default_history_size(),
        }
    }
}

/// robots.txt handling
#[derive(Debug, Clone, Deserialize)]
pub struct RobotsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age after which a cached policy is refetched (seconds)
    #[serde(rename = "cache-ttl-secs", default = "default_robots_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(rename = "fetch-timeout-secs", default = "default_robots_timeout")]
    pub fetch_timeout_secs: u64,

    /// Maximum number of cached origins
    #[serde(rename = "cache-capacity", default = "default_robots_capacity")]
    pub cache_capacity: usize,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: default_robots_ttl(),
            fetch_timeout_secs: default_robots_timeout(),
            cache_capacity: default_robots_capacity(),
        }
    }
}

/// Where listings are collected from
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    /// Listing page URL; `{range}` is replaced by daily, weekly or monthly
    #[serde(rename = "url-template")]
    pub url_template: String,

    /// Governor key shared by every collection fetch
    #[serde(rename = "endpoint-key", default = "default_endpoint_key")]
    pub endpoint_key: String,
}

/// CSS selectors used to extract listings from the collected page
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Selector matching one element per listing
    pub item: String,

    /// Selector (within an item) for the anchor carrying the listing name and link
    pub name: String,

    pub description: Option<String>,

    pub language: Option<String>,

    /// Selector for the total star count
    pub stars: Option<String>,

    /// Selector for the stars gained during the collected period
    #[serde(rename = "period-stars")]
    pub period_stars: Option<String>,
}

/// Listing filters applied before enrichment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "min-total-stars", default)]
    pub min_total_stars: u64,

    #[serde(rename = "min-period-stars", default)]
    pub min_period_stars: PeriodStarsConfig,

    /// When non-empty, only these languages are kept
    #[serde(rename = "language-whitelist", default)]
    pub language_whitelist: Vec<String>,

    #[serde(rename = "language-blacklist", default)]
    pub language_blacklist: Vec<String>,
}

/// Minimum period stars per task type
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodStarsConfig {
    #[serde(default)]
    pub daily: u64,
    #[serde(default)]
    pub weekly: u64,
    #[serde(default)]
    pub monthly: u64,
}

/// Keyword subscription narrowing the filtered listings
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionConfig {
    /// No keywords disables the stage
    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(rename = "match-mode", default)]
    pub match_mode: MatchMode,

    #[serde(rename = "match-fields", default = "default_match_fields")]
    pub match_fields: Vec<MatchField>,

    /// Minimum word similarity in fuzzy mode, 0.0 to 1.0
    #[serde(rename = "fuzzy-threshold", default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    #[serde(rename = "case-sensitive", default)]
    pub case_sensitive: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            match_mode: MatchMode::default(),
            match_fields: default_match_fields(),
            fuzzy_threshold: default_fuzzy_threshold(),
            case_sensitive: false,
        }
    }
}

/// How a keyword is compared with a listing field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Substring
    Exact,
    /// Keyword is a regular expression searched in the field
    Regex,
    /// Any word of the field is similar enough to the keyword
    #[default]
    Fuzzy,
}

/// Listing field a keyword may match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Name,
    Description,
    Language,
}

/// Summary generation through an ordered provider chain
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Provider ids in the order they are tried
    #[serde(default)]
    pub chain: Vec<String>,

    #[serde(rename = "provider", default)]
    pub providers: Vec<ProviderConfig>,

    /// Maximum number of in-flight provider calls
    #[serde(rename = "max-concurrent", default = "default_enrich_concurrency")]
    pub max_concurrent: usize,

    /// Retries per provider after its first attempt
    #[serde(rename = "max-retries", default = "default_enrich_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_enrich_timeout")]
    pub timeout_secs: u64,

    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    #[serde(rename = "backoff-cap-ms", default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,

    /// Jitter band as a fraction of the computed backoff
    #[serde(rename = "jitter-factor", default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Prompt with `{name}`, `{description}`, `{stars}`, `{language}` and `{url}` placeholders
    #[serde(rename = "prompt-template", default = "default_prompt_template")]
    pub prompt_template: String,

    #[serde(rename = "max-tokens", default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chain: Vec::new(),
            providers: Vec::new(),
            max_concurrent: default_enrich_concurrency(),
            max_retries: default_enrich_retries(),
            timeout_secs: default_enrich_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            jitter_factor: default_jitter_factor(),
            prompt_template: default_prompt_template(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// One OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: String,

    #[serde(rename = "base-url")]
    pub base_url: String,

    pub model: String,

    #[serde(rename = "api-key")]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api-key` is absent
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,
}

/// Calendar scheduling and job retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed offset used to decide local dates and times, e.g. "+08:00"
    #[serde(rename = "utc-offset", default = "default_utc_offset")]
    pub utc_offset: String,

    #[serde(rename = "tick-secs", default = "default_tick_secs")]
    pub tick_secs: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Retries of a failed job run after its first attempt
    #[serde(rename = "max-retries", default = "default_job_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles for each further retry
    #[serde(rename = "retry-delay-secs", default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_daily")]
    pub daily: ScheduleEntryConfig,

    #[serde(default = "default_weekly")]
    pub weekly: ScheduleEntryConfig,

    #[serde(default = "default_monthly")]
    pub monthly: ScheduleEntryConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
            tick_secs: default_tick_secs(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_retries: default_job_retries(),
            retry_delay_secs: default_retry_delay(),
            daily: default_daily(),
            weekly: default_weekly(),
            monthly: default_monthly(),
        }
    }
}

/// Seed values for one schedule entry
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleEntryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local time of day, "HH:MM"
    pub time: String,

    /// Day of week for weekly entries, e.g. "sun"
    pub weekday: Option<String>,
}

/// Alert delivery
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertingConfig {
    /// JSON webhook receiving alerts; alerts are only logged when absent
    #[serde(rename = "webhook-url")]
    pub webhook_url: Option<String>,

    #[serde(rename = "webhook-timeout-secs", default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving delivered JSON snapshots
    #[serde(rename = "delivery-dir")]
    pub delivery_dir: String,
}

fn default_match_fields() -> Vec<MatchField> {
    vec![MatchField::Name, MatchField::Description]
}

fn default_fuzzy_threshold() -> f64 {
    0.6
}

fn default_true() -> bool {
    true
}

fn default_fetch_concurrency() -> usize {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1_000
}

fn default_backoff_cap() -> u64 {
    30_000
}

fn default_initial_interval() -> u64 {
    500
}

fn default_min_interval() -> u64 {
    500
}

fn default_max_interval() -> u64 {
    5_000
}

fn default_success_threshold() -> u32 {
    10
}

fn default_speedup_factor() -> f64 {
    0.9
}

fn default_error_factor() -> f64 {
    1.5
}

fn default_rate_limit_factor() -> f64 {
    2.0
}

fn default_errors_before_backoff() -> u32 {
    1
}

fn default_history_size() -> usize {
    100
}

fn default_robots_ttl() -> u64 {
    24 * 60 * 60
}

fn default_robots_timeout() -> u64 {
    10
}

fn default_robots_capacity() -> usize {
    128
}

fn default_endpoint_key() -> String {
    "collection".to_string()
}

fn default_enrich_concurrency() -> usize {
    3
}

fn default_enrich_retries() -> u32 {
    5
}

fn default_enrich_timeout() -> u64 {
    30
}

fn default_jitter_factor() -> f64 {
    0.1
}

fn default_prompt_template() -> String {
    "Summarize the project {name} in two sentences for a developer newsletter.\n\
     Description: {description}\nLanguage: {language}\nStars: {stars}\nURL: {url}"
        .to_string()
}

fn default_max_tokens() -> u32 {
    200
}

fn default_temperature() -> f32 {
    0.7
}

fn default_utc_offset() -> String {
    "+08:00".to_string()
}

fn default_tick_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    16
}

fn default_job_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    60
}

fn default_daily() -> ScheduleEntryConfig {
    ScheduleEntryConfig {
        enabled: true,
        time: "08:00".to_string(),
        weekday: None,
    }
}

fn default_weekly() -> ScheduleEntryConfig {
    ScheduleEntryConfig {
        enabled: true,
        time: "22:00".to_string(),
        weekday: Some("sun".to_string()),
    }
}

fn default_monthly() -> ScheduleEntryConfig {
    ScheduleEntryConfig {
        enabled: true,
        time: "22:00".to_string(),
        weekday: None,
    }
}

fn default_webhook_timeout() -> u64 {
    10
}
