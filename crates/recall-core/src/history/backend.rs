//! Storage seam shared by the Qdrant and redb backends.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ChatRecord, ChatSummary, HistoryStats, SearchHit};

/// A persisted collection of chat records with vector search
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    /// Create the collection for `dims`-sized vectors if it does not exist
    async fn ensure_collection(&self, dims: usize) -> Result<()>;

    /// Append one record; its embedding must be populated
    async fn insert(&self, record: &ChatRecord) -> Result<()>;

    /// Best `limit` records by `cosine_similarity + 1.0`, highest first
    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchHit>>;

    /// Up to `limit` records, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<ChatSummary>>;

    async fn stats(&self) -> Result<HistoryStats>;

    async fn health_check(&self) -> Result<bool>;

    /// Human-readable location, for logs and the CLI
    fn describe(&self) -> String;
}

/// Cosine similarity in [-1, 1]; zero-norm or mismatched vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Score used for ranking; keeps every score non-negative
pub fn similarity_score(query: &[f32], stored: &[f32]) -> f32 {
    cosine_similarity(query, stored) + 1.0
}
