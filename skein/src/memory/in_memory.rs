//! In-memory [`Memory`] implementation.
//!
//! Keyword-overlap scoring, bounded history, no persistence. Meant for tests,
//! examples, and as the reference behavior for real providers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::AgentError;
use crate::memory::{ChatMessage, Document, Memory, MemoryResult};

#[derive(Clone, Debug)]
struct Entry {
    content: String,
    content_type: String,
    source: String,
    timestamp: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    documents: Vec<Document>,
    history: Vec<ChatMessage>,
    session: String,
}

/// Concurrency-safe in-process memory.
#[derive(Default)]
pub struct InMemoryMemory {
    inner: RwLock<Inner>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of query words that appear in `content`, in `[0, 1]`.
    fn score(query: &str, content: &str) -> f32 {
        let content_lower = content.to_lowercase();
        let words: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.len() > 1)
            .collect();
        if words.is_empty() {
            return 0.0;
        }
        let hits = words
            .iter()
            .filter(|w| content_lower.contains(&w.to_lowercase()))
            .count();
        hits as f32 / words.len() as f32
    }
}

#[async_trait]
impl Memory for InMemoryMemory {
    async fn store(
        &self,
        content: &str,
        content_type: &str,
        source: &str,
    ) -> Result<(), AgentError> {
        let mut inner = self.inner.write().await;
        inner.entries.push(Entry {
            content: content.to_string(),
            content_type: content_type.to_string(),
            source: source.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn query(&self, query: &str, limit: usize) -> Result<Vec<MemoryResult>, AgentError> {
        let inner = self.inner.read().await;
        let mut hits: Vec<MemoryResult> = inner
            .entries
            .iter()
            .filter_map(|e| {
                let score = Self::score(query, &e.content);
                if score <= 0.0 {
                    return None;
                }
                let mut metadata = HashMap::new();
                metadata.insert("content_type".to_string(), e.content_type.clone());
                Some(MemoryResult {
                    content: e.content.clone(),
                    score,
                    source: e.source.clone(),
                    metadata,
                    timestamp: e.timestamp,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn add_message(&self, role: &str, content: &str) -> Result<(), AgentError> {
        let mut inner = self.inner.write().await;
        inner.history.push(ChatMessage::new(role, content));
        Ok(())
    }

    async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>, AgentError> {
        let inner = self.inner.read().await;
        let start = inner.history.len().saturating_sub(limit);
        Ok(inner.history[start..].to_vec())
    }

    async fn ingest_document(&self, doc: Document) -> Result<(), AgentError> {
        let mut inner = self.inner.write().await;
        inner.entries.push(Entry {
            content: doc.content.clone(),
            content_type: "document".to_string(),
            source: doc.title.clone(),
            timestamp: Utc::now(),
        });
        inner.documents.push(doc);
        Ok(())
    }

    async fn set_session(&self, id: &str) -> Result<(), AgentError> {
        let mut inner = self.inner.write().await;
        if inner.session != id {
            inner.session = id.to_string();
            inner.history.clear();
        }
        Ok(())
    }
}
