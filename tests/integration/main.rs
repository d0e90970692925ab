//! Integration tests against wiremock servers

mod common;
mod enrich_tests;
mod fetch_tests;
mod pipeline_tests;
