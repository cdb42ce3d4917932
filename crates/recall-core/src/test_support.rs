//! Deterministic fakes shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::history::{Embedder, HistoryBackend};
use crate::providers::Completion;
use crate::types::{
    ChatRecord, ChatSummary, HistoryStats, LlmProvider, RecallError, RecallResult, SearchHit,
};

pub const TEST_DIMS: usize = 256;

/// Bag-of-words embedder: each lowercase word adds 1.0 to a hashed bucket
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; TEST_DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[fnv1a(&word.to_lowercase()) % TEST_DIMS] += 1.0;
        }
        Ok(vector)
    }
}

/// HashEmbedder that remembers every text it was asked to embed
#[derive(Default)]
pub struct RecordingEmbedder {
    inputs: Mutex<Vec<String>>,
}

impl RecordingEmbedder {
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for RecordingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inputs.lock().unwrap().push(text.to_string());
        HashEmbedder.embed(text).await
    }
}

fn fnv1a(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}

/// Backend whose every call fails
pub struct FailingBackend;

#[async_trait]
impl HistoryBackend for FailingBackend {
    async fn ensure_collection(&self, _dims: usize) -> Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn insert(&self, _record: &ChatRecord) -> Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn search(&self, _vector: Vec<f32>, _limit: usize) -> Result<Vec<SearchHit>> {
        Err(anyhow!("connection refused"))
    }

    async fn recent(&self, _limit: usize) -> Result<Vec<ChatSummary>> {
        Err(anyhow!("connection refused"))
    }

    async fn stats(&self) -> Result<HistoryStats> {
        Err(anyhow!("connection refused"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// Completion fake that counts calls and echoes or fails
pub struct FakeCompletion {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeCompletion {
    pub fn answering() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Completion for FakeCompletion {
    async fn complete(&self, provider: LlmProvider, prompt: &str) -> RecallResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RecallError::provider(provider, "HTTP 503: overloaded"));
        }
        Ok(format!("{} says: {}", provider, prompt))
    }
}
