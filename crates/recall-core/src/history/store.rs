//! ============================================================================
//! Qdrant Store - Chat history in a Qdrant collection
//! ============================================================================
//! Stores one point per exchange and ranks by cosine similarity.
//! ============================================================================

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    Direction, Distance, FieldType, Filter, OrderBy, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info, warn};

use super::backend::HistoryBackend;
use crate::types::{ChatRecord, ChatSummary, HistoryStats, LlmProvider, SearchHit};

/// Chat history backed by a Qdrant collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    url: String,
}

impl QdrantStore {
    /// Connect to Qdrant; the collection is not touched until `ensure_collection`
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            url: url.to_string(),
        })
    }

    async fn count(&self, filter: Option<Filter>) -> Result<u64> {
        let mut request = CountPointsBuilder::new(&self.collection).exact(true);
        if let Some(filter) = filter {
            request = request.filter(filter);
        }

        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| anyhow!("Failed to count points: {}", e))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}

/// Qdrant's scroll limit is a u32; larger requests saturate
fn scroll_limit(limit: usize) -> u32 {
    u32::try_from(limit).unwrap_or(u32::MAX)
}

#[async_trait]
impl HistoryBackend for QdrantStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if exists {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!("Creating collection: {} ({} dims)", self.collection, dims);

        let created = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dims as u64, Distance::Cosine)),
            )
            .await;

        match created {
            Ok(_) => info!("Collection {} created successfully", self.collection),
            // Another process won the race
            Err(e) if is_already_exists(&e.to_string()) => {
                debug!("Collection {} created concurrently", self.collection);
                return Ok(());
            }
            Err(e) => return Err(anyhow!("Failed to create collection: {}", e)),
        }

        for (field, field_type) in [
            ("provider", FieldType::Keyword),
            ("created_at", FieldType::Integer),
        ] {
            if let Err(e) = self
                .client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field,
                    field_type,
                ))
                .await
            {
                if !is_already_exists(&e.to_string()) {
                    return Err(anyhow!("Failed to index field {}: {}", field, e));
                }
            }
        }

        Ok(())
    }

    async fn insert(&self, record: &ChatRecord) -> Result<()> {
        if record.embedding.is_empty() {
            return Err(anyhow!("Cannot store chat record without embedding"));
        }

        debug!("Storing chat {} ({})", record.id, record.provider);

        let payload: HashMap<String, Value> = [
            ("provider".to_string(), Value::from(record.provider.as_str())),
            ("query".to_string(), Value::from(record.query.clone())),
            ("response".to_string(), Value::from(record.response.clone())),
            ("timestamp".to_string(), Value::from(record.timestamp.to_rfc3339())),
            (
                "created_at".to_string(),
                Value::from(record.timestamp.timestamp_millis()),
            ),
        ]
        .into_iter()
        .collect();

        let point = PointStruct::new(record.id.to_string(), record.embedding.clone(), payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| anyhow!("Failed to upsert chat record: {}", e))?;

        Ok(())
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchHit>> {
        debug!("Searching {} (limit: {})", self.collection, limit);

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, limit as u64).with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to search chat history: {}", e))?;

        let hits: Vec<SearchHit> = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                Some(SearchHit {
                    chat: summary_from_payload(&point.payload)?,
                    // Qdrant's cosine score is the raw similarity
                    score: point.score + 1.0,
                })
            })
            .collect();

        debug!("Found {} matching chats", hits.len());
        Ok(hits)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ChatSummary>> {
        let order_by = OrderBy {
            key: "created_at".to_string(),
            direction: Some(Direction::Desc as i32),
            start_from: None,
        };

        let scroll_result = self
            .client
            .scroll(
                ScrollPointsBuilder::new(&self.collection)
                    .limit(scroll_limit(limit))
                    .order_by(order_by)
                    .with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to scroll chat history: {}", e))?;

        let mut chats: Vec<ChatSummary> = scroll_result
            .result
            .into_iter()
            .filter_map(|point| summary_from_payload(&point.payload))
            .collect();
        chats.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(chats)
    }

    async fn stats(&self) -> Result<HistoryStats> {
        let total = self.count(None).await?;

        let mut counts = Vec::with_capacity(LlmProvider::ALL.len());
        for provider in LlmProvider::ALL {
            let filter = Filter::must([Condition::matches("provider", provider.as_str().to_string())]);
            counts.push((provider, self.count(Some(filter)).await?));
        }

        Ok(HistoryStats::from_counts(total, counts))
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }

    fn describe(&self) -> String {
        format!("qdrant {} (collection {})", self.url, self.collection)
    }
}

fn is_already_exists(message: &str) -> bool {
    message.to_lowercase().contains("already exists")
}

fn summary_from_payload(payload: &HashMap<String, Value>) -> Option<ChatSummary> {
    let provider = get_string(payload, "provider")?.parse().ok()?;
    let timestamp = get_string(payload, "timestamp")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| get_i64(payload, "created_at").and_then(DateTime::from_timestamp_millis))?;

    Some(ChatSummary {
        timestamp,
        provider,
        query: get_string(payload, "query")?,
        response: get_string(payload, "response")?,
    })
}

// Helper functions to extract values from payload
fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str().map(|s| s.to_string()))
}

fn get_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    payload.get(key).and_then(|v| v.as_integer())
}
