//! Summary generation with provider fallback
//!
//! `FallbackExecutor::run` walks a `ProviderChain` until one provider answers.

mod fallback;
mod provider;

pub use fallback::{provider_key, FallbackExecutor};
pub use provider::{
    ChatCompletionProvider, EnrichmentRequest, EnrichmentResponse, Provider, ProviderChain,
};
