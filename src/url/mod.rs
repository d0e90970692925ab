//! URL handling module for Trend-Relay
//!
//! Domain and origin extraction for the robots cache, plus the small helpers
//! the collection job uses to build targets and resolve listing links.

mod domain;

use crate::state::TaskType;
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, origin_key, robots_url};

/// Expands a listing URL template for a task type
///
/// Every `{range}` placeholder is replaced by `daily`, `weekly` or `monthly`.
pub fn expand_template(template: &str, task: TaskType) -> Result<Url, ::url::ParseError> {
    Url::parse(&template.replace("{range}", task.as_str()))
}

/// Resolves a possibly relative link found on `base`
///
/// Returns None for links that do not resolve to an http(s) URL.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut resolved = base.join(href).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    resolved.set_fragment(None);
    Some(resolved)
}
