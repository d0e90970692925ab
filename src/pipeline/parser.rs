//! Listing extraction from the collected page
//!
//! Selectors come from configuration; nothing about the page layout is
//! hard-coded here.

use crate::config::ParserConfig;
use crate::pipeline::listing::{parse_count, Listing};
use crate::url::resolve_link;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Turns a fetched page into listings
pub trait ListingParser: Send + Sync {
    /// Extracts every listing found on `html`, resolving links against `base_url`
    fn parse(&self, html: &str, base_url: &Url) -> Vec<Listing>;
}

/// Parser driven by CSS selectors
#[derive(Debug, Clone)]
pub struct SelectorListingParser {
    item: Selector,
    name: Selector,
    description: Option<Selector>,
    language: Option<Selector>,
    stars: Option<Selector>,
    period_stars: Option<Selector>,
}

impl SelectorListingParser {
    /// Compiles the configured selectors
    ///
    /// # Arguments
    ///
    /// * `config` - Selector strings; `item` and `name` are required
    ///
    /// # Returns
    ///
    /// * `Err(ConfigError::InvalidSelector)` - A selector does not compile
    pub fn from_config(config: &ParserConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            item: compile("item", &config.item)?,
            name: compile("name", &config.name)?,
            description: compile_opt("description", config.description.as_deref())?,
            language: compile_opt("language", config.language.as_deref())?,
            stars: compile_opt("stars", config.stars.as_deref())?,
            period_stars: compile_opt("period-stars", config.period_stars.as_deref())?,
        })
    }

    fn parse_item(&self, item: ElementRef<'_>, base_url: &Url) -> Option<Listing> {
        let anchor = item.select(&self.name).next()?;
        let name = normalize_name(&element_text(anchor));
        if name.is_empty() {
            return None;
        }

        let url = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(base_url, href))?;

        Some(Listing {
            name,
            url: url.to_string(),
            description: self.first_text(item, self.description.as_ref()),
            language: self.first_text(item, self.language.as_ref()),
            stars: self
                .first_text(item, self.stars.as_ref())
                .and_then(|text| parse_count(&text)),
            period_stars: self
                .first_text(item, self.period_stars.as_ref())
                .and_then(|text| parse_count(&text)),
        })
    }

    fn first_text(&self, item: ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
        let element = item.select(selector?).next()?;
        Some(element_text(element)).filter(|text| !text.is_empty())
    }
}

impl ListingParser for SelectorListingParser {
    fn parse(&self, html: &str, base_url: &Url) -> Vec<Listing> {
        let document = Html::parse_document(html);

        let mut listings = Vec::new();
        let mut skipped = 0usize;
        for item in document.select(&self.item) {
            match self.parse_item(item, base_url) {
                Some(listing) => listings.push(listing),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::debug!("Skipped {} items without a usable name link", skipped);
        }
        listings
    }
}

fn compile(field: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", field, selector, e)))
}

fn compile_opt(field: &str, selector: Option<&str>) -> Result<Option<Selector>, ConfigError> {
    selector.map(|s| compile(field, s)).transpose()
}

/// Text content with whitespace runs collapsed
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// "owner / project" becomes "owner/project"
fn normalize_name(text: &str) -> String {
    text.replace(" / ", "/").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <article class="row">
            <h2><a href="/acme/rocket"> acme /
                rocket </a></h2>
            <p class="desc">A fast rocket</p>
            <span class="lang">Rust</span>
            <a class="stars" href="/acme/rocket/stargazers">1,234</a>
            <span class="gained">85 stars today</span>
          </article>
          <article class="row">
            <h2><a href="https://example.com/beta/tool">beta / tool</a></h2>
            <a class="stars" href="/beta/tool/stargazers">2.5k</a>
          </article>
          <article class="row">
            <p class="desc">No name link here</p>
          </article>
        </body></html>
    "#;

    fn create_test_config() -> ParserConfig {
        ParserConfig {
            item: "article.row".to_string(),
            name: "h2 a".to_string(),
            description: Some("p.desc".to_string()),
            language: Some("span.lang".to_string()),
            stars: Some("a.stars".to_string()),
            period_stars: Some("span.gained".to_string()),
        }
    }

    fn base_url() -> Url {
        Url::parse("https://example.com/trending?since=daily").unwrap()
    }

    #[test]
    fn test_parse_listings() {
        let parser = SelectorListingParser::from_config(&create_test_config()).unwrap();
        let listings = parser.parse(PAGE, &base_url());

        assert_eq!(listings.len(), 2);

        let first = &listings[0];
        assert_eq!(first.name, "acme/rocket");
        assert_eq!(first.url, "https://example.com/acme/rocket");
        assert_eq!(first.description.as_deref(), Some("A fast rocket"));
        assert_eq!(first.language.as_deref(), Some("Rust"));
        assert_eq!(first.stars, Some(1234));
        assert_eq!(first.period_stars, Some(85));

        let second = &listings[1];
        assert_eq!(second.name, "beta/tool");
        assert_eq!(second.stars, Some(2500));
        assert_eq!(second.description, None);
        assert_eq!(second.period_stars, None);
    }

    #[test]
    fn test_optional_selectors_absent() {
        let mut config = create_test_config();
        config.description = None;
        config.period_stars = None;

        let parser = SelectorListingParser::from_config(&config).unwrap();
        let listings = parser.parse(PAGE, &base_url());
        assert!(listings.iter().all(|l| l.description.is_none() && l.period_stars.is_none()));
    }

    #[test]
    fn test_empty_page() {
        let parser = SelectorListingParser::from_config(&create_test_config()).unwrap();
        assert!(parser.parse("<html><body></body></html>", &base_url()).is_empty());
    }

    #[test]
    fn test_invalid_selector() {
        for bad in ["h2 >", "article..row"] {
            let mut config = create_test_config();
            config.name = bad.to_string();
            assert!(matches!(
                SelectorListingParser::from_config(&config),
                Err(ConfigError::InvalidSelector(_))
            ));
        }
    }
}
