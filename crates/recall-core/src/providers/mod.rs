//! ============================================================================
//! Provider Module - Chat completions from the three supported vendors
//! ============================================================================
//! - OpenAiClient: Chat Completions API
//! - AnthropicClient: Messages API
//! - GoogleClient: Gemini generateContent API
//!
//! Dispatch is a closed match over [`LlmProvider`]; there is no runtime
//! registration.
//! ============================================================================

mod anthropic;
mod google;
mod openai;

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use openai::OpenAiClient;

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{ProviderConfig, RecallConfig};
use crate::types::{LlmProvider, RecallError, RecallResult};

/// Single-prompt text completion
#[async_trait]
pub trait Completion: Send + Sync {
    /// Send `prompt` as the entire user message and return the answer text
    async fn complete(&self, provider: LlmProvider, prompt: &str) -> RecallResult<String>;
}

/// One long-lived client per vendor; `None` when its API key is missing
pub struct ProviderClients {
    openai: Option<OpenAiClient>,
    anthropic: Option<AnthropicClient>,
    google: Option<GoogleClient>,
}

impl ProviderClients {
    pub fn new(
        openai: Option<OpenAiClient>,
        anthropic: Option<AnthropicClient>,
        google: Option<GoogleClient>,
    ) -> Self {
        Self {
            openai,
            anthropic,
            google,
        }
    }

    pub fn from_config(config: &RecallConfig) -> Self {
        let timeout = config.request_timeout();

        let openai = keyed(config.provider(LlmProvider::OpenAi)).map(|(key, settings)| {
            OpenAiClient::new(key, &settings.base_url, &settings.model, timeout)
        });
        let anthropic = keyed(config.provider(LlmProvider::Anthropic)).map(|(key, settings)| {
            AnthropicClient::new(key, &settings.base_url, &settings.model, timeout)
        });
        let google = keyed(config.provider(LlmProvider::Google)).map(|(key, settings)| {
            GoogleClient::new(key, &settings.base_url, &settings.model, timeout)
        });

        let clients = Self::new(openai, anthropic, google);
        info!("Providers configured: {:?}", clients.configured());
        clients
    }

    /// Providers that have an API key
    pub fn configured(&self) -> Vec<LlmProvider> {
        LlmProvider::ALL
            .into_iter()
            .filter(|p| match p {
                LlmProvider::OpenAi => self.openai.is_some(),
                LlmProvider::Anthropic => self.anthropic.is_some(),
                LlmProvider::Google => self.google.is_some(),
            })
            .collect()
    }
}

fn keyed(settings: &ProviderConfig) -> Option<(String, &ProviderConfig)> {
    settings.api_key.clone().map(|key| (key, settings))
}

#[async_trait]
impl Completion for ProviderClients {
    async fn complete(&self, provider: LlmProvider, prompt: &str) -> RecallResult<String> {
        let missing = || RecallError::provider(provider, format!("{} is not set", provider.api_key_var()));

        let result = match provider {
            LlmProvider::OpenAi => self.openai.as_ref().ok_or_else(missing)?.complete(prompt).await,
            LlmProvider::Anthropic => {
                self.anthropic.as_ref().ok_or_else(missing)?.complete(prompt).await
            }
            LlmProvider::Google => self.google.as_ref().ok_or_else(missing)?.complete(prompt).await,
        };

        result.map_err(|e| RecallError::provider(provider, format!("{:#}", e)))
    }
}

// ============================================================================
// Shared HTTP helpers
// ============================================================================

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Read a response body, turning non-2xx statuses into errors.
/// All three vendors report failures as `{"error": {"message": ...}}`.
pub(crate) async fn read_body(response: reqwest::Response, vendor: &str) -> anyhow::Result<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| anyhow!("Failed to read {} response body: {}", vendor, e.without_url()))?;

    if !status.is_success() {
        if let Ok(error) = serde_json::from_str::<ApiErrorBody>(&body) {
            return Err(anyhow!("{} API error {}: {}", vendor, status, error.error.message));
        }
        return Err(anyhow!("{} API error {}: {}", vendor, status, body));
    }

    debug!("{} responded with {} bytes", vendor, body.len());
    Ok(body)
}
