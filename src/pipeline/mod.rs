//! Collection pipeline
//!
//! This module handles:
//! - Extracting listings from the collected page with configured selectors
//! - Star and language filters, then keyword subscriptions
//! - Delivery of the enriched set
//! - The job that ties fetch, filter, enrichment and delivery together

mod delivery;
mod filters;
mod job;
mod listing;
mod parser;

pub use delivery::{Delivery, JsonFileDelivery};
pub use filters::{KeywordMatcher, ListingFilter};
pub use job::{render_prompt, PromptSettings, TrendingJob};
pub use listing::{parse_count, EnrichedListing, Listing};
pub use parser::{ListingParser, SelectorListingParser};
