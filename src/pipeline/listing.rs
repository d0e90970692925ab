//! Listing records passed through the collection pipeline

use serde::Serialize;

/// One entry extracted from the listing page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    /// Identifier such as "owner/project"
    pub name: String,

    /// Absolute link to the listing
    pub url: String,

    pub description: Option<String>,

    pub language: Option<String>,

    /// Total stars, None when unreadable
    pub stars: Option<u64>,

    /// Stars gained during the collected period, None when unreadable
    pub period_stars: Option<u64>,
}

impl Listing {
    /// Summary used when no provider produced one
    pub fn fallback_summary(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => format!("{} (no description available)", self.name),
        }
    }
}

/// A listing with its generated summary, as delivered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedListing {
    #[serde(flatten)]
    pub listing: Listing,

    pub summary: String,

    /// Provider that wrote the summary, None for a fallback summary
    pub provider_id: Option<String>,
}

impl EnrichedListing {
    pub fn enriched(listing: Listing, summary: String, provider_id: &str) -> Self {
        Self {
            listing,
            summary,
            provider_id: Some(provider_id.to_string()),
        }
    }

    pub fn fallback(listing: Listing) -> Self {
        let summary = listing.fallback_summary();
        Self {
            listing,
            summary,
            provider_id: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provider_id.is_none()
    }
}

/// Reads a human-formatted count such as "3,456", "1.2k" or "1.5m"
///
/// The first number in `text` is used, so "1,234 stars today" reads as 1234.
pub fn parse_count(text: &str) -> Option<u64> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    let start = cleaned.find(|c: char| c.is_ascii_digit())?;
    let rest = &cleaned[start..];

    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    let value: f64 = rest[..end].parse().ok()?;

    let multiplier = match rest[end..].chars().next() {
        Some('k') | Some('K') => 1_000.0,
        Some('m') | Some('M') => 1_000_000.0,
        _ => 1.0,
    };

    Some((value * multiplier).round() as u64)
}
