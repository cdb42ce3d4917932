// ============================================================================
// LocalStore — Embedded chat history (redb)
// ============================================================================
// Single-file store for running without a Qdrant server.
// Default path: ~/.chat-recall/history.redb (override via RECALL_DB_PATH)
// Search is a brute-force cosine scan over every record.
// ============================================================================

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use super::backend::{similarity_score, HistoryBackend};
use crate::types::{ChatRecord, ChatSummary, HistoryStats, LlmProvider, SearchHit};

// Table definitions
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const DIMS_KEY: &str = "dims";

/// Chat history in an embedded redb file
pub struct LocalStore {
    db: Database,
    path: PathBuf,
}

impl LocalStore {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening local history at: {}", path.display());

        let db = Database::create(path).map_err(|e| anyhow!("Failed to open database: {}", e))?;

        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Every record in key (creation) order
    fn load_all(&self) -> Result<Vec<ChatRecord>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(RECORDS)
            .map_err(|e| anyhow!("Failed to open records table: {}", e))?;

        let mut records = Vec::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate records: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let record: ChatRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize chat record: {}", e))?;
            records.push(record);
        }
        Ok(records)
    }
}

/// Keys sort by creation time, then id
fn record_key(record: &ChatRecord) -> String {
    format!("{:020}:{}", record.timestamp.timestamp_micros(), record.id)
}

#[async_trait]
impl HistoryBackend for LocalStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(RECORDS)
                .map_err(|e| anyhow!("Failed to create records table: {}", e))?;
            let mut meta = write_txn
                .open_table(META)
                .map_err(|e| anyhow!("Failed to create meta table: {}", e))?;

            let existing = meta
                .get(DIMS_KEY)
                .map_err(|e| anyhow!("Failed to read collection dims: {}", e))?
                .map(|v| v.value());

            match existing {
                Some(stored) if stored != dims as u64 => {
                    return Err(anyhow!(
                        "Collection at {} holds {}-dimensional vectors, configured {}",
                        self.path.display(),
                        stored,
                        dims
                    ));
                }
                Some(_) => debug!("Local collection already exists"),
                None => {
                    meta.insert(DIMS_KEY, dims as u64)
                        .map_err(|e| anyhow!("Failed to record collection dims: {}", e))?;
                    info!("Created local collection ({} dims)", dims);
                }
            }
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(())
    }

    async fn insert(&self, record: &ChatRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(anyhow!("Cannot store chat record without embedding"));
        }

        let key = record_key(record);
        let value = bincode::serialize(record)
            .map_err(|e| anyhow!("Failed to serialize chat record: {}", e))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(RECORDS)
                .map_err(|e| anyhow!("Failed to open records table: {}", e))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(|e| anyhow!("Failed to insert chat record: {}", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored chat record: {}", record.id);
        Ok(())
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .load_all()?
            .into_iter()
            .map(|record| SearchHit {
                score: similarity_score(&vector, &record.embedding),
                chat: record.summary(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChatSummary>> {
        Ok(self
            .load_all()?
            .iter()
            .rev()
            .take(limit)
            .map(ChatRecord::summary)
            .collect())
    }

    async fn stats(&self) -> Result<HistoryStats> {
        let records = self.load_all()?;

        let counts = LlmProvider::ALL.map(|provider| {
            let n = records.iter().filter(|r| r.provider == provider).count() as u64;
            (provider, n)
        });

        Ok(HistoryStats::from_counts(records.len() as u64, counts))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.db.begin_read().is_ok())
    }

    fn describe(&self) -> String {
        format!("local {}", self.path.display())
    }
}
