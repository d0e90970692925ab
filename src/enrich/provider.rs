//! Enrichment providers
//!
//! A provider turns a prompt into generated text. The shipped kind speaks the
//! OpenAI-compatible chat-completions protocol, which covers DeepSeek, NVIDIA
//! and most self-hosted gateways.

use crate::config::{EnrichmentConfig, ProviderConfig};
use crate::{ConfigError, ProviderError};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Prompt and sampling settings for one enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRequest {
    /// What is being enriched, used in logs
    pub subject: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Validated generated text and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResponse {
    pub provider_id: String,
    pub content: String,
    /// Attempts spent on the provider that answered
    pub attempts: u32,
}

/// A single summary source
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, also used as the pacing key suffix
    fn id(&self) -> &str;

    /// Performs one call; retries and timeouts are the caller's job
    async fn call(&self, request: &EnrichmentRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    #[serde(default)]
    choices: Vec<ChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct ChoiceRaw {
    message: MessageRaw,
}

#[derive(Debug, Deserialize)]
struct MessageRaw {
    content: Option<String>,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionProvider {
    id: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl ChatCompletionProvider {
    pub fn new(id: &str, base_url: &str, model: &str, api_key: Option<String>, client: Client) -> Self {
        Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            client,
        }
    }

    /// Builds a provider from configuration
    ///
    /// The API key comes from `api-key`, else from the variable named by
    /// `api-key-env`. A provider without a key is still built; its calls will
    /// most likely be rejected by the endpoint.
    pub fn from_config(config: &ProviderConfig, client: Client) -> Self {
        let api_key = config.api_key.clone().or_else(|| {
            config
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.trim().is_empty())
        });

        if api_key.is_none() {
            tracing::warn!("No API key configured for provider '{}'", config.id);
        }

        Self::new(&config.id, &config.base_url, &config.model, api_key, client)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl Provider for ChatCompletionProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(&self, request: &EnrichmentRequest) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Network(format!("timeout: {}", e))
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(if status.is_server_error() {
                ProviderError::Http {
                    status: status.as_u16(),
                    body,
                }
            } else {
                ProviderError::Api(format!("HTTP {}: {}", status.as_u16(), body))
            });
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        raw.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))
    }
}

/// Ordered list of providers tried by the fallback executor
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Resolves the configured chain into providers
    ///
    /// Without an explicit `chain`, providers are tried in declaration order.
    pub fn from_config(config: &EnrichmentConfig, client: Client) -> Result<Self, ConfigError> {
        let order: Vec<&str> = if config.chain.is_empty() {
            config.providers.iter().map(|p| p.id.as_str()).collect()
        } else {
            config.chain.iter().map(String::as_str).collect()
        };

        let mut providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(order.len());
        for id in order {
            let provider_config = config
                .providers
                .iter()
                .find(|p| p.id == id)
                .ok_or_else(|| {
                    ConfigError::Validation(format!("Chain references unknown provider '{}'", id))
                })?;
            providers.push(Arc::new(ChatCompletionProvider::from_config(
                provider_config,
                client.clone(),
            )));
        }

        Ok(Self { providers })
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
