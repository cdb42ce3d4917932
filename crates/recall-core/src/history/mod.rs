//! ============================================================================
//! History Module - Persistent, searchable chat history
//! ============================================================================
//! Every answered question is embedded and stored so later questions can
//! recall semantically related exchanges.
//!
//! ## Architecture
//! ```text
//! question + answer → Embed → Backend (Qdrant | redb)
//!                                   ↑
//!        search query → Embed → cosine_similarity + 1.0 → top N
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use recall_core::history::{EmbeddingService, HistoryStore, QdrantStore};
//!
//! let backend = QdrantStore::new(url, None, "chat_history", timeout)?;
//! let store = HistoryStore::open(Arc::new(backend), Arc::new(embeddings), 1536).await?;
//!
//! store.index("What is Rust?", "A systems language.", LlmProvider::OpenAi).await?;
//! let hits = store.search("tell me about Rust", 5).await?;
//! ```
//! ============================================================================

mod backend;
mod embeddings;
mod local;
mod manager;
mod store;

pub use backend::{cosine_similarity, similarity_score, HistoryBackend};
pub use embeddings::{Embedder, EmbeddingService, UnavailableEmbedder};
pub use local::LocalStore;
pub use manager::{HistoryStore, EXCHANGE_SEPARATOR};
pub use store::QdrantStore;
