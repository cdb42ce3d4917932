//! ============================================================================
//! Recall Core - Chat history memory for LLM assistants
//! ============================================================================
//! Asks OpenAI, Anthropic or Google models on behalf of a host, stores every
//! answered exchange as an embedding, and recalls related exchanges later.
//!
//! - [`history`]: embeddings and the Qdrant / redb history backends
//! - [`providers`]: chat completion clients
//! - [`gateway`]: the three host-facing tools and the history resource
//! - [`mcp`]: JSON-RPC over stdio
//! ============================================================================

pub mod config;
pub mod gateway;
pub mod history;
pub mod mcp;
pub mod providers;
pub mod types;

#[cfg(test)]
mod test_support;

pub use config::{BackendKind, RecallConfig};
pub use gateway::{ToolGateway, ToolOutput};
pub use history::HistoryStore;
pub use mcp::McpServer;
pub use providers::{Completion, ProviderClients};
pub use types::*;

use std::sync::Arc;

use tracing::{info, warn};

use history::{
    EmbeddingService, Embedder, HistoryBackend, LocalStore, QdrantStore, UnavailableEmbedder,
};

/// Long-lived services built once at start-up and shared by every request
pub struct RecallContext {
    pub config: RecallConfig,
    pub history: Arc<HistoryStore>,
    pub providers: Arc<ProviderClients>,
}

impl RecallContext {
    /// Wire backend, embedder and provider clients from configuration.
    ///
    /// An unreachable backend only logs a warning here; the collection is
    /// created on first use instead.
    pub async fn from_config(config: RecallConfig) -> RecallResult<Self> {
        let backend = open_backend(&config)?;
        info!("History backend: {}", backend.describe());

        let embedder: Arc<dyn Embedder> = match EmbeddingService::from_config(&config) {
            Ok(service) => {
                info!("Embeddings: {} via {}", service.model(), service.base_url());
                Arc::new(service)
            }
            Err(e) => {
                warn!("Embeddings unavailable: {}", e);
                Arc::new(UnavailableEmbedder::new(e.to_string()))
            }
        };

        let history = HistoryStore::new(backend, embedder, config.embedding_dim);
        if let Err(e) = history.ensure_collection().await {
            warn!("Could not prepare chat history at start-up: {}", e);
        }

        let providers = ProviderClients::from_config(&config);

        Ok(Self {
            config,
            history: Arc::new(history),
            providers: Arc::new(providers),
        })
    }

    pub fn gateway(&self) -> ToolGateway {
        ToolGateway::new(self.history.clone(), self.providers.clone())
    }

    pub fn mcp_server(&self) -> McpServer {
        McpServer::new(Arc::new(self.gateway()))
    }
}

fn open_backend(config: &RecallConfig) -> RecallResult<Arc<dyn HistoryBackend>> {
    match config.backend {
        BackendKind::Qdrant => {
            let store = QdrantStore::new(
                &config.qdrant_url,
                config.qdrant_api_key.clone(),
                &config.collection,
                config.request_timeout(),
            )
            .map_err(|e| RecallError::Config(format!("{:#}", e)))?;
            Ok(Arc::new(store))
        }
        BackendKind::Local => {
            let path = config.resolve_db_path()?;
            let store = LocalStore::open(&path)
                .map_err(|e| RecallError::Persistence(format!("{:#}", e)))?;
            Ok(Arc::new(store))
        }
    }
}
