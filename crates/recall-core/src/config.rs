//! ============================================================================
//! Configuration - Environment-driven settings
//! ============================================================================
//! Every setting comes from a key-value environment. The binary loads `.env`
//! before calling [`RecallConfig::from_env`].
//! ============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{LlmProvider, RecallError, RecallResult};

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "chat_history";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Which store holds the chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Qdrant,
    Local,
}

impl std::str::FromStr for BackendKind {
    type Err = RecallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(BackendKind::Qdrant),
            "local" | "redb" => Ok(BackendKind::Local),
            other => Err(RecallError::Config(format!(
                "Unknown backend '{}'. Valid values: qdrant, local",
                other
            ))),
        }
    }
}

/// Per-vendor completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    pub backend: BackendKind,
    pub qdrant_url: String,
    #[serde(skip_serializing)]
    pub qdrant_api_key: Option<String>,
    pub collection: String,
    /// Local redb file; `None` resolves to ~/.chat-recall/history.redb
    pub db_path: Option<PathBuf>,
    #[serde(skip_serializing)]
    pub openai: ProviderConfig,
    #[serde(skip_serializing)]
    pub anthropic: ProviderConfig,
    #[serde(skip_serializing)]
    pub google: ProviderConfig,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub request_timeout_secs: u64,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Qdrant,
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            qdrant_api_key: None,
            collection: DEFAULT_COLLECTION.to_string(),
            db_path: None,
            openai: ProviderConfig {
                api_key: None,
                base_url: OPENAI_BASE_URL.to_string(),
                model: "gpt-4".to_string(),
            },
            anthropic: ProviderConfig {
                api_key: None,
                base_url: ANTHROPIC_BASE_URL.to_string(),
                model: "claude-3-5-sonnet-20241022".to_string(),
            },
            google: ProviderConfig {
                api_key: None,
                base_url: GOOGLE_BASE_URL.to_string(),
                model: "gemini-pro".to_string(),
            },
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RecallConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> RecallResult<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Read configuration from an explicit key-value map
    pub fn from_vars(vars: HashMap<String, String>) -> RecallResult<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(backend) = get("RECALL_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(url) = get("QDRANT_URL") {
            config.qdrant_url = url;
        }
        config.qdrant_api_key = get("QDRANT_API_KEY");
        if let Some(collection) = get("RECALL_COLLECTION") {
            config.collection = collection;
        }
        config.db_path = get("RECALL_DB_PATH").map(PathBuf::from);

        config.openai.api_key = get("OPENAI_API_KEY");
        config.anthropic.api_key = get("ANTHROPIC_API_KEY");
        config.google.api_key = get("GOOGLE_API_KEY");

        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai.base_url = url;
        }
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            config.anthropic.base_url = url;
        }
        if let Some(url) = get("GOOGLE_BASE_URL") {
            config.google.base_url = url;
        }
        if let Some(model) = get("OPENAI_MODEL") {
            config.openai.model = model;
        }
        if let Some(model) = get("ANTHROPIC_MODEL") {
            config.anthropic.model = model;
        }
        if let Some(model) = get("GOOGLE_MODEL") {
            config.google.model = model;
        }

        if let Some(model) = get("EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dim) = get("EMBEDDING_DIM") {
            config.embedding_dim = parse_positive("EMBEDDING_DIM", &dim)? as usize;
        }
        if let Some(secs) = get("RECALL_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_positive("RECALL_REQUEST_TIMEOUT_SECS", &secs)?;
        }

        Ok(config)
    }

    /// Settings for one provider
    pub fn provider(&self, provider: LlmProvider) -> &ProviderConfig {
        match provider {
            LlmProvider::OpenAi => &self.openai,
            LlmProvider::Anthropic => &self.anthropic,
            LlmProvider::Google => &self.google,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve the local database path, creating its parent directory
    pub fn resolve_db_path(&self) -> RecallResult<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }

        let home = dirs::home_dir()
            .ok_or_else(|| RecallError::Config("Cannot determine home directory".to_string()))?;
        let dir = home.join(".chat-recall");
        std::fs::create_dir_all(&dir).map_err(|e| {
            RecallError::Config(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        Ok(dir.join("history.redb"))
    }
}

fn parse_positive(key: &str, value: &str) -> RecallResult<u64> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(RecallError::Config(format!(
            "{} must be a positive integer, got '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_from_empty_env() {
        let config = RecallConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.backend, BackendKind::Qdrant);
        assert_eq!(config.collection, "chat_history");
        assert_eq!(config.embedding_dim, 1536);
        assert_eq!(config.embedding_model, "text-embedding-ada-002");
        assert_eq!(config.openai.model, "gpt-4");
        assert!(config.anthropic.api_key.is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = RecallConfig::from_vars(vars(&[
            ("RECALL_BACKEND", "local"),
            ("RECALL_DB_PATH", "/tmp/history.redb"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("GOOGLE_MODEL", "gemini-1.5-flash"),
            ("EMBEDDING_DIM", "3072"),
            ("OPENAI_API_KEY", "   "),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.resolve_db_path().unwrap(), PathBuf::from("/tmp/history.redb"));
        assert_eq!(config.provider(LlmProvider::Anthropic).api_key.as_deref(), Some("sk-ant"));
        assert_eq!(config.provider(LlmProvider::Google).model, "gemini-1.5-flash");
        assert_eq!(config.embedding_dim, 3072);
        // blank values count as unset
        assert!(config.openai.api_key.is_none());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = RecallConfig::from_vars(vars(&[("EMBEDDING_DIM", "0")])).unwrap_err();
        assert!(matches!(err, RecallError::Config(_)));

        let err = RecallConfig::from_vars(vars(&[("RECALL_BACKEND", "elastic")])).unwrap_err();
        assert!(err.to_string().contains("Unknown backend"));
    }

    #[test]
    fn test_secrets_not_serialized() {
        let config = RecallConfig::from_vars(vars(&[
            ("OPENAI_API_KEY", "sk-secret"),
            ("QDRANT_API_KEY", "qd-secret"),
        ]))
        .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
