//! Memory: the internal interface the agent loop talks to.
//!
//! [`Memory`] is the narrow surface the execution core consumes: store,
//! query, chat history, and RAG context assembly. External memory providers
//! expose a broader surface ([`MemoryProvider`]); [`ProviderAdapter`] bridges
//! one into the other and normalizes provider-specific result types into the
//! unified [`MemoryResult`] / [`RagContext`] shapes.
//!
//! Store and query failures must always be recoverable at call sites: the
//! agent loop logs them and continues rather than aborting the turn.

mod adapter;
mod in_memory;

pub use adapter::{KnowledgeRecord, MemoryProvider, PersonalRecord, ProviderAdapter, StoredMessage};
pub use in_memory::InMemoryMemory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// One memory hit: content plus a relevance score in `[0, 1]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryResult {
    pub content: String,
    pub score: f32,
    /// Where the hit came from, e.g. `personal` or `knowledge`.
    pub source: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryResult {
    pub fn new(content: impl Into<String>, score: f32, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score: score.clamp(0.0, 1.0),
            source: source.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }
}

/// One chat turn in session history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A document for knowledge-base ingestion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Options for [`Memory::build_context`].
#[derive(Clone, Debug)]
pub struct ContextOptions {
    pub personal_limit: usize,
    pub knowledge_limit: usize,
    pub history_limit: usize,
    pub max_tokens: usize,
    pub include_sources: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            personal_limit: crate::config::DEFAULT_HISTORY_LIMIT,
            knowledge_limit: crate::config::DEFAULT_HISTORY_LIMIT,
            history_limit: crate::config::DEFAULT_HISTORY_LIMIT,
            max_tokens: crate::config::DEFAULT_RAG_TOKENS,
            include_sources: true,
        }
    }
}

/// The structured bundle used to enrich a user prompt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RagContext {
    pub personal: Vec<MemoryResult>,
    pub knowledge: Vec<MemoryResult>,
    pub history: Vec<ChatMessage>,
    /// Estimated token count of the formatted context.
    pub token_count: usize,
    pub sources: Vec<String>,
}

impl RagContext {
    pub fn is_empty(&self) -> bool {
        self.personal.is_empty() && self.knowledge.is_empty() && self.history.is_empty()
    }
}

/// Internal memory interface consumed by the agent loop.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Persists one entry. `content_type` tags what it is (`user_message`,
    /// `agent_response`, ...), `source` who produced it.
    async fn store(
        &self,
        content: &str,
        content_type: &str,
        source: &str,
    ) -> Result<(), AgentError>;

    /// Returns up to `limit` hits relevant to `query`, best first.
    async fn query(&self, query: &str, limit: usize) -> Result<Vec<MemoryResult>, AgentError>;

    /// Appends one chat turn to session history.
    async fn add_message(&self, role: &str, content: &str) -> Result<(), AgentError>;

    /// Returns the last `limit` chat turns, oldest first.
    async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>, AgentError>;

    async fn ingest_document(&self, doc: Document) -> Result<(), AgentError>;

    /// Assembles the RAG bundle for one query. The default implementation
    /// composes `query` and `history` and estimates the token count.
    async fn build_context(
        &self,
        query: &str,
        opts: &ContextOptions,
    ) -> Result<RagContext, AgentError> {
        let personal = self.query(query, opts.personal_limit).await?;
        let history = if opts.history_limit > 0 {
            self.history(opts.history_limit).await?
        } else {
            Vec::new()
        };
        let token_count = personal
            .iter()
            .map(|r| crate::prompt::estimate_tokens(&r.content))
            .chain(history.iter().map(|m| crate::prompt::estimate_tokens(&m.content)))
            .sum();
        let sources = if opts.include_sources {
            let mut sources: Vec<String> = personal.iter().map(|r| r.source.clone()).collect();
            sources.dedup();
            sources
        } else {
            Vec::new()
        };
        Ok(RagContext {
            personal,
            knowledge: Vec::new(),
            history,
            token_count,
            sources,
        })
    }

    /// Allocates a fresh session id.
    fn new_session(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Switches subsequent history operations to the given session.
    async fn set_session(&self, _id: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), AgentError> {
        Ok(())
    }
}
