//! ============================================================================
//! History Store - Orchestrates chat persistence and recall
//! ============================================================================
//! Combines an embedder with a storage backend and maps their failures onto
//! the typed [`RecallError`] kinds.
//! ============================================================================

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::backend::HistoryBackend;
use super::embeddings::Embedder;
use crate::types::{
    ChatRecord, ChatSummary, HistoryStats, LlmProvider, RecallError, RecallResult, SearchHit,
};

/// Joins question and answer before embedding an exchange
pub const EXCHANGE_SEPARATOR: &str = "\n";

/// High-level chat history API
pub struct HistoryStore {
    backend: Arc<dyn HistoryBackend>,
    embedder: Arc<dyn Embedder>,
    dims: usize,
    // Set once the collection is known to exist
    ready: OnceCell<()>,
}

impl HistoryStore {
    /// Wrap a backend without touching it
    pub fn new(backend: Arc<dyn HistoryBackend>, embedder: Arc<dyn Embedder>, dims: usize) -> Self {
        Self {
            backend,
            embedder,
            dims,
            ready: OnceCell::new(),
        }
    }

    /// Wrap a backend and make sure its collection exists
    pub async fn open(
        backend: Arc<dyn HistoryBackend>,
        embedder: Arc<dyn Embedder>,
        dims: usize,
    ) -> RecallResult<Self> {
        let store = Self::new(backend, embedder, dims);
        store.ensure_collection().await?;
        Ok(store)
    }

    /// Create the collection if absent; safe to call repeatedly
    pub async fn ensure_collection(&self) -> RecallResult<()> {
        self.backend
            .ensure_collection(self.dims)
            .await
            .map_err(persistence)?;
        let _ = self.ready.set(());
        Ok(())
    }

    /// Ensure the collection once per process; failures are retried next call
    async fn ready(&self) -> RecallResult<()> {
        self.ready
            .get_or_try_init(|| async {
                self.backend
                    .ensure_collection(self.dims)
                    .await
                    .map_err(persistence)
            })
            .await
            .map(|_| ())
    }

    /// Embed text, checking the vector has the collection's dimensionality
    pub async fn embed(&self, text: &str) -> RecallResult<Vec<f32>> {
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| RecallError::Embedding(format!("{:#}", e)))?;

        if vector.len() != self.dims {
            return Err(RecallError::Embedding(format!(
                "expected {} dimensions, got {}",
                self.dims,
                vector.len()
            )));
        }

        Ok(vector)
    }

    /// Persist one exchange
    pub async fn index(
        &self,
        query: &str,
        response: &str,
        provider: LlmProvider,
    ) -> RecallResult<ChatRecord> {
        let embedding = self
            .embed(&format!("{}{}{}", query, EXCHANGE_SEPARATOR, response))
            .await?;

        let record = ChatRecord::new(query.to_string(), response.to_string(), provider)
            .with_embedding(embedding);

        self.ready().await?;
        self.backend.insert(&record).await.map_err(persistence)?;

        info!("Indexed chat {} ({})", record.id, provider);
        Ok(record)
    }

    /// Most similar past exchanges, best first
    pub async fn search(&self, query: &str, limit: usize) -> RecallResult<Vec<SearchHit>> {
        if limit == 0 {
            return Err(RecallError::Validation(
                "limit must be a positive integer".to_string(),
            ));
        }

        debug!("Searching chat history with query: {}", query);

        let vector = self.embed(query).await?;
        self.ready().await?;
        let mut hits = self
            .backend
            .search(vector, limit)
            .await
            .map_err(persistence)?;
        hits.truncate(limit);
        Ok(hits)
    }

    /// Newest exchanges, without an embedding call
    pub async fn recent(&self, limit: usize) -> RecallResult<Vec<ChatSummary>> {
        self.ready().await?;
        self.backend.recent(limit).await.map_err(persistence)
    }

    /// Total and per-provider counts
    pub async fn stats(&self) -> RecallResult<HistoryStats> {
        self.ready().await?;
        self.backend.stats().await.map_err(persistence)
    }

    /// Check if the backend is reachable
    pub async fn health_check(&self) -> RecallResult<bool> {
        self.backend.health_check().await.map_err(persistence)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }
}

fn persistence(e: anyhow::Error) -> RecallError {
    RecallError::Persistence(format!("{:#}", e))
}
