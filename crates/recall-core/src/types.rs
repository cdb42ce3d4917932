//! ============================================================================
//! Core Types - Chat records, providers, and error kinds
//! ============================================================================
//! Shared by the history store, provider clients, and tool gateway.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// LLM vendors whose answers are recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Google,
}

impl LlmProvider {
    /// Every provider, in dispatch order
    pub const ALL: [LlmProvider; 3] = [LlmProvider::OpenAi, LlmProvider::Anthropic, LlmProvider::Google];

    /// Keyword stored in the `provider` field
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Google => "google",
        }
    }

    /// Environment variable holding this provider's API key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::Google => "GOOGLE_API_KEY",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            "google" => Ok(LlmProvider::Google),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// One persisted question/answer exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Point id in the backing store
    pub id: Uuid,
    /// When the provider answered
    pub timestamp: DateTime<Utc>,
    pub provider: LlmProvider,
    pub query: String,
    pub response: String,
    /// Embedding of `query + "\n" + response`
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl ChatRecord {
    /// Create a record stamped with the current time
    pub fn new(query: String, response: String, provider: LlmProvider) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            provider,
            query,
            response,
            embedding: Vec::new(),
        }
    }

    /// Attach a pre-computed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Metadata view returned to callers (no id, no vector)
    pub fn summary(&self) -> ChatSummary {
        ChatSummary {
            timestamp: self.timestamp,
            provider: self.provider,
            query: self.query.clone(),
            response: self.response.clone(),
        }
    }
}

/// Record metadata as returned by searches and the history resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub timestamp: DateTime<Utc>,
    pub provider: LlmProvider,
    pub query: String,
    pub response: String,
}

/// A search result with its similarity score in [0, 2]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub chat: ChatSummary,
    pub score: f32,
}

/// Aggregate counts over the collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: u64,
    /// Non-zero counts only, largest first
    pub by_provider: Vec<(LlmProvider, u64)>,
}

impl HistoryStats {
    /// Build from raw per-provider counts, dropping empty buckets
    pub fn from_counts(total: u64, counts: impl IntoIterator<Item = (LlmProvider, u64)>) -> Self {
        let mut by_provider: Vec<_> = counts.into_iter().filter(|(_, n)| *n > 0).collect();
        by_provider.sort_by(|a, b| b.1.cmp(&a.1));
        Self { total, by_provider }
    }
}

/// Error kinds surfaced by the history store and provider clients
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecallError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("{provider} request failed: {message}")]
    Provider { provider: LlmProvider, message: String },

    #[error("Invalid argument: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecallError {
    pub fn provider(provider: LlmProvider, message: impl Into<String>) -> Self {
        RecallError::Provider {
            provider,
            message: message.into(),
        }
    }
}

pub type RecallResult<T> = std::result::Result<T, RecallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("openai".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("Anthropic".parse::<LlmProvider>().unwrap(), LlmProvider::Anthropic);
        assert_eq!(" google ".parse::<LlmProvider>().unwrap(), LlmProvider::Google);
        assert!("mistral".parse::<LlmProvider>().is_err());
        assert!("".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_provider_serde_matches_keyword() {
        for provider in LlmProvider::ALL {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider.as_str()));
        }
    }

    #[test]
    fn test_summary_drops_embedding() {
        let record = ChatRecord::new("q".to_string(), "a".to_string(), LlmProvider::Google)
            .with_embedding(vec![0.5; 8]);
        let summary = record.summary();
        assert_eq!(summary.query, "q");
        assert_eq!(summary.provider, LlmProvider::Google);

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("embedding").is_none());
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_stats_drop_empty_buckets_and_sort() {
        let stats = HistoryStats::from_counts(
            5,
            [
                (LlmProvider::OpenAi, 1),
                (LlmProvider::Anthropic, 0),
                (LlmProvider::Google, 4),
            ],
        );
        assert_eq!(stats.total, 5);
        assert_eq!(
            stats.by_provider,
            vec![(LlmProvider::Google, 4), (LlmProvider::OpenAi, 1)]
        );
    }

    #[test]
    fn test_provider_error_names_vendor() {
        let err = RecallError::provider(LlmProvider::Anthropic, "HTTP 401");
        assert_eq!(err.to_string(), "anthropic request failed: HTTP 401");
    }
}
