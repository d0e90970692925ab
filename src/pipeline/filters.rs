//! Listing filters applied before enrichment

use crate::config::{FilterConfig, MatchField, MatchMode, SubscriptionConfig};
use crate::pipeline::listing::Listing;
use crate::state::TaskType;
use crate::ConfigError;
use regex::{Regex, RegexBuilder};

/// Star and language thresholds
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    min_total_stars: u64,
    min_period_stars: [u64; 3],
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl ListingFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        let lower = |langs: &[String]| -> Vec<String> {
            langs.iter().map(|l| l.trim().to_lowercase()).collect()
        };

        Self {
            min_total_stars: config.min_total_stars,
            min_period_stars: [
                config.min_period_stars.daily,
                config.min_period_stars.weekly,
                config.min_period_stars.monthly,
            ],
            whitelist: lower(&config.language_whitelist),
            blacklist: lower(&config.language_blacklist),
        }
    }

    fn min_period_stars(&self, task: TaskType) -> u64 {
        match task {
            TaskType::Daily => self.min_period_stars[0],
            TaskType::Weekly => self.min_period_stars[1],
            TaskType::Monthly => self.min_period_stars[2],
        }
    }

    /// Returns true if `listing` passes every threshold for `task`
    ///
    /// Period stars that could not be read (missing or zero) never drop a
    /// listing; the total-stars threshold still applies.
    pub fn keep(&self, listing: &Listing, task: TaskType) -> bool {
        if listing.stars.unwrap_or(0) < self.min_total_stars {
            tracing::debug!("Filtered {}: total stars below {}", listing.name, self.min_total_stars);
            return false;
        }

        let min_period = self.min_period_stars(task);
        if let Some(period) = listing.period_stars.filter(|p| *p > 0) {
            if period < min_period {
                tracing::debug!("Filtered {}: {} {} stars below {}", listing.name, period, task, min_period);
                return false;
            }
        }

        let language = listing
            .language
            .as_deref()
            .map(|l| l.trim().to_lowercase())
            .unwrap_or_default();

        if !self.whitelist.is_empty() && !self.whitelist.contains(&language) {
            tracing::debug!("Filtered {}: language '{}' not whitelisted", listing.name, language);
            return false;
        }

        if self.blacklist.contains(&language) {
            tracing::debug!("Filtered {}: language '{}' blacklisted", listing.name, language);
            return false;
        }

        true
    }

    /// Keeps the listings that pass, preserving order
    pub fn apply(&self, listings: Vec<Listing>, task: TaskType) -> Vec<Listing> {
        let before = listings.len();
        let kept: Vec<_> = listings.into_iter().filter(|l| self.keep(l, task)).collect();
        tracing::info!("Filters kept {} of {} {} listings", kept.len(), before, task);
        kept
    }
}

#[derive(Debug, Clone)]
struct Keyword {
    text: String,
    /// Lowercased unless matching is case sensitive
    needle: String,
    pattern: Option<Regex>,
}

/// Narrows listings to those mentioning a subscribed keyword
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<Keyword>,
    mode: MatchMode,
    fields: Vec<MatchField>,
    threshold: f64,
    case_sensitive: bool,
}

impl KeywordMatcher {
    pub fn from_config(config: &SubscriptionConfig) -> Result<Self, ConfigError> {
        let keywords = config
            .keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|text| -> Result<Keyword, ConfigError> {
                let pattern = match config.match_mode {
                    MatchMode::Regex => Some(
                        RegexBuilder::new(text)
                            .case_insensitive(!config.case_sensitive)
                            .build()
                            .map_err(|e| {
                                ConfigError::Validation(format!(
                                    "Invalid keyword pattern '{}': {}",
                                    text, e
                                ))
                            })?,
                    ),
                    _ => None,
                };
                let needle = if config.case_sensitive {
                    text.clone()
                } else {
                    text.to_lowercase()
                };
                Ok(Keyword {
                    text: text.clone(),
                    needle,
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            keywords,
            mode: config.match_mode,
            fields: config.match_fields.clone(),
            threshold: config.fuzzy_threshold,
            case_sensitive: config.case_sensitive,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.keywords.is_empty()
    }

    fn field<'a>(listing: &'a Listing, field: MatchField) -> Option<&'a str> {
        match field {
            MatchField::Name => Some(listing.name.as_str()),
            MatchField::Description => listing.description.as_deref(),
            MatchField::Language => listing.language.as_deref(),
        }
    }

    fn matches_text(&self, text: &str, keyword: &Keyword) -> bool {
        if text.is_empty() {
            return false;
        }

        if let Some(pattern) = &keyword.pattern {
            return pattern.is_match(text);
        }

        let text = if self.case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        };

        match self.mode {
            MatchMode::Fuzzy => text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|word| !word.is_empty())
                .any(|word| strsim::normalized_levenshtein(word, &keyword.needle) >= self.threshold),
            _ => text.contains(&keyword.needle),
        }
    }

    /// Keywords found in any matched field, in configured order
    pub fn matched_keywords(&self, listing: &Listing) -> Vec<&str> {
        self.keywords
            .iter()
            .filter(|keyword| {
                self.fields
                    .iter()
                    .filter_map(|f| Self::field(listing, *f))
                    .any(|text| self.matches_text(text, keyword))
            })
            .map(|keyword| keyword.text.as_str())
            .collect()
    }

    /// Keeps the matching listings, preserving order
    ///
    /// When nothing matches, every listing is kept so a narrow subscription
    /// never empties a run.
    pub fn apply(&self, listings: Vec<Listing>) -> Vec<Listing> {
        if !self.is_enabled() || listings.is_empty() {
            return listings;
        }

        let before = listings.len();
        let (matched, rest): (Vec<_>, Vec<_>) = listings.into_iter().partition(|listing| {
            let hits = self.matched_keywords(listing);
            if !hits.is_empty() {
                tracing::debug!("Matched {} (keywords: {})", listing.name, hits.join(", "));
            }
            !hits.is_empty()
        });

        if matched.is_empty() {
            tracing::info!("No listings matched subscribed keywords, keeping all {}", before);
            return rest;
        }

        tracing::info!("Keywords matched {} of {} listings", matched.len(), before);
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeriodStarsConfig;

    fn listing(name: &str, stars: Option<u64>, period: Option<u64>, language: Option<&str>) -> Listing {
        Listing {
            name: name.to_string(),
            url: format!("https://example.com/{}", name),
            description: None,
            language: language.map(str::to_string),
            stars,
            period_stars: period,
        }
    }

    fn create_test_config() -> FilterConfig {
        FilterConfig {
            min_total_stars: 100,
            min_period_stars: PeriodStarsConfig {
                daily: 10,
                weekly: 50,
                monthly: 200,
            },
            language_whitelist: Vec::new(),
            language_blacklist: vec!["HTML".to_string()],
        }
    }

    #[test]
    fn test_total_stars_threshold() {
        let filter = ListingFilter::from_config(&create_test_config());
        assert!(!filter.keep(&listing("a/low", Some(99), Some(20), None), TaskType::Daily));
        assert!(!filter.keep(&listing("a/unknown", None, Some(20), None), TaskType::Daily));
        assert!(filter.keep(&listing("a/ok", Some(100), Some(20), None), TaskType::Daily));
    }

    #[test]
    fn test_period_threshold_per_task() {
        let filter = ListingFilter::from_config(&create_test_config());
        let item = listing("a/b", Some(500), Some(30), None);
        assert!(filter.keep(&item, TaskType::Daily));
        assert!(!filter.keep(&item, TaskType::Weekly));
    }

    #[test]
    fn test_unknown_period_stars_kept() {
        let filter = ListingFilter::from_config(&create_test_config());
        assert!(filter.keep(&listing("a/none", Some(500), None, None), TaskType::Monthly));
        assert!(filter.keep(&listing("a/zero", Some(500), Some(0), None), TaskType::Monthly));
    }

    #[test]
    fn test_language_lists() {
        let mut config = create_test_config();
        let filter = ListingFilter::from_config(&config);
        assert!(!filter.keep(&listing("a/web", Some(500), None, Some("html")), TaskType::Daily));
        assert!(filter.keep(&listing("a/none", Some(500), None, None), TaskType::Daily));

        config.language_whitelist = vec!["Rust".to_string(), "Go".to_string()];
        let filter = ListingFilter::from_config(&config);
        assert!(filter.keep(&listing("a/rs", Some(500), None, Some("Rust")), TaskType::Daily));
        assert!(!filter.keep(&listing("a/py", Some(500), None, Some("Python")), TaskType::Daily));
        assert!(!filter.keep(&listing("a/none", Some(500), None, None), TaskType::Daily));
    }

    #[test]
    fn test_apply_preserves_order() {
        let filter = ListingFilter::from_config(&create_test_config());
        let kept = filter.apply(
            vec![
                listing("a/one", Some(500), None, None),
                listing("a/low", Some(1), None, None),
                listing("a/two", Some(500), None, None),
            ],
            TaskType::Daily,
        );
        let names: Vec<_> = kept.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["a/one", "a/two"]);
    }

    fn described(name: &str, description: &str, language: &str) -> Listing {
        Listing {
            description: Some(description.to_string()),
            ..listing(name, Some(500), None, Some(language))
        }
    }

    fn create_test_subscription(mode: MatchMode, keywords: &[&str]) -> SubscriptionConfig {
        SubscriptionConfig {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            match_mode: mode,
            ..SubscriptionConfig::default()
        }
    }

    #[test]
    fn test_exact_keyword_case() {
        let mut config = create_test_subscription(MatchMode::Exact, &["Rocket"]);
        let item = described("acme/rocket", "Launches things", "Rust");
        let matcher = KeywordMatcher::from_config(&config).unwrap();
        assert_eq!(matcher.matched_keywords(&item), vec!["Rocket"]);

        config.case_sensitive = true;
        let matcher = KeywordMatcher::from_config(&config).unwrap();
        assert!(matcher.matched_keywords(&item).is_empty());
    }

    #[test]
    fn test_regex_keyword() {
        let config = create_test_subscription(MatchMode::Regex, &["^ACME/", r"\bllm\b"]);
        let matcher = KeywordMatcher::from_config(&config).unwrap();

        let item = described("acme/rocket", "Serve an LLM locally", "Rust");
        assert_eq!(matcher.matched_keywords(&item), vec!["^ACME/", r"\bllm\b"]);

        let other = described("beta/acme", "llmish tooling", "Go");
        assert!(matcher.matched_keywords(&other).is_empty());

        let bad = create_test_subscription(MatchMode::Regex, &["agent("]);
        assert!(matches!(
            KeywordMatcher::from_config(&bad),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_fuzzy_keyword_by_word() {
        let mut config = create_test_subscription(MatchMode::Fuzzy, &["agents"]);
        let item = described("acme/crew", "Multi-agent orchestration.", "Python");
        let matcher = KeywordMatcher::from_config(&config).unwrap();
        assert_eq!(matcher.matched_keywords(&item), vec!["agents"]);

        let far = described("acme/db", "An embedded database", "C");
        assert!(matcher.matched_keywords(&far).is_empty());

        config.fuzzy_threshold = 0.9;
        let matcher = KeywordMatcher::from_config(&config).unwrap();
        assert!(matcher.matched_keywords(&item).is_empty());
    }

    #[test]
    fn test_only_configured_fields_match() {
        let mut config = create_test_subscription(MatchMode::Exact, &["rust"]);
        let item = described("acme/rocket", "A web framework", "Rust");
        let matcher = KeywordMatcher::from_config(&config).unwrap();
        assert!(matcher.matched_keywords(&item).is_empty());

        config.match_fields = vec![MatchField::Language];
        let matcher = KeywordMatcher::from_config(&config).unwrap();
        assert_eq!(matcher.matched_keywords(&item), vec!["rust"]);

        // Missing fields never match
        let bare = listing("acme/rocket", Some(500), None, None);
        assert!(matcher.matched_keywords(&bare).is_empty());
    }

    #[test]
    fn test_keyword_stage_narrows_or_passes_through() {
        let listings = vec![
            described("acme/rocket", "A web framework", "Rust"),
            described("beta/tool", "A handy tool", "Go"),
            described("gamma/site", "Web scraping helpers", "Python"),
        ];

        let disabled = KeywordMatcher::from_config(&SubscriptionConfig::default()).unwrap();
        assert!(!disabled.is_enabled());
        assert_eq!(disabled.apply(listings.clone()).len(), 3);

        let web = KeywordMatcher::from_config(&create_test_subscription(MatchMode::Exact, &["web"]))
            .unwrap();
        let names: Vec<_> = web.apply(listings.clone()).into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["acme/rocket", "gamma/site"]);

        let none = KeywordMatcher::from_config(&create_test_subscription(MatchMode::Exact, &["kernel"]))
            .unwrap();
        let names: Vec<_> = none.apply(listings).into_iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["acme/rocket", "beta/tool", "gamma/site"]);
    }
}
