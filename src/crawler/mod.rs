//! Collection-side HTTP machinery
//!
//! - `Fetcher`: robots-gated, paced, bounded-concurrency retrieval with retry
//! - `RateGovernor` / `GovernorRegistry`: adaptive per-endpoint pacing, also
//!   used by the enrichment executor for provider calls

mod fetcher;
mod governor;

pub use fetcher::{build_http_client, user_agent_string, FetchTarget, Fetcher};
pub use governor::{Cancelled, GovernorRegistry, RateGovernor};
