//! Adapter from a broad external memory provider to the internal [`Memory`]
//! interface.
//!
//! Providers speak their own record types (personal hits, knowledge hits,
//! stored messages); the adapter normalizes them into [`MemoryResult`] and
//! [`ChatMessage`] so the agent loop never sees provider shapes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AgentError;
use crate::memory::{ChatMessage, ContextOptions, Document, Memory, MemoryResult, RagContext};

/// A personal-memory hit in provider shape.
#[derive(Clone, Debug)]
pub struct PersonalRecord {
    pub text: String,
    pub relevance: f32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A knowledge-base hit in provider shape.
#[derive(Clone, Debug)]
pub struct KnowledgeRecord {
    pub text: String,
    pub relevance: f32,
    pub document_title: String,
    pub created_at: DateTime<Utc>,
}

/// A chat turn in provider shape.
#[derive(Clone, Debug)]
pub struct StoredMessage {
    pub role: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// The broad external provider surface. Implemented by real backends
/// (vector stores, embedding services); only the subset the core needs is
/// specified here.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn store_entry(
        &self,
        content: &str,
        content_type: &str,
        source: &str,
    ) -> Result<(), AgentError>;

    async fn search_personal(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<PersonalRecord>, AgentError>;

    async fn search_knowledge(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<KnowledgeRecord>, AgentError>;

    async fn append_message(&self, role: &str, content: &str) -> Result<(), AgentError>;

    async fn messages(&self, limit: usize) -> Result<Vec<StoredMessage>, AgentError>;

    async fn ingest(&self, doc: Document) -> Result<(), AgentError>;

    fn create_session(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    async fn select_session(&self, _id: &str) -> Result<(), AgentError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Bridges a [`MemoryProvider`] into the internal [`Memory`] interface.
pub struct ProviderAdapter {
    provider: Arc<dyn MemoryProvider>,
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn MemoryProvider>) -> Self {
        Self { provider }
    }

    fn personal_to_result(hit: PersonalRecord) -> MemoryResult {
        let mut metadata = HashMap::new();
        if !hit.tags.is_empty() {
            metadata.insert("tags".to_string(), hit.tags.join(","));
        }
        MemoryResult {
            content: hit.text,
            score: hit.relevance.clamp(0.0, 1.0),
            source: "personal".to_string(),
            metadata,
            timestamp: hit.created_at,
        }
    }

    fn knowledge_to_result(hit: KnowledgeRecord) -> MemoryResult {
        let mut metadata = HashMap::new();
        metadata.insert("document".to_string(), hit.document_title.clone());
        MemoryResult {
            content: hit.text,
            score: hit.relevance.clamp(0.0, 1.0),
            source: "knowledge".to_string(),
            metadata,
            timestamp: hit.created_at,
        }
    }
}

#[async_trait]
impl Memory for ProviderAdapter {
    async fn store(
        &self,
        content: &str,
        content_type: &str,
        source: &str,
    ) -> Result<(), AgentError> {
        self.provider.store_entry(content, content_type, source).await
    }

    async fn query(&self, query: &str, limit: usize) -> Result<Vec<MemoryResult>, AgentError> {
        let hits = self.provider.search_personal(query, limit).await?;
        Ok(hits.into_iter().map(Self::personal_to_result).collect())
    }

    async fn add_message(&self, role: &str, content: &str) -> Result<(), AgentError> {
        self.provider.append_message(role, content).await
    }

    async fn history(&self, limit: usize) -> Result<Vec<ChatMessage>, AgentError> {
        let messages = self.provider.messages(limit).await?;
        Ok(messages
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.text,
                timestamp: m.created_at,
            })
            .collect())
    }

    async fn ingest_document(&self, doc: Document) -> Result<(), AgentError> {
        self.provider.ingest(doc).await
    }

    /// Combines personal and knowledge searches, unlike the default
    /// personal-only composition.
    async fn build_context(
        &self,
        query: &str,
        opts: &ContextOptions,
    ) -> Result<RagContext, AgentError> {
        let personal: Vec<MemoryResult> = self
            .provider
            .search_personal(query, opts.personal_limit)
            .await?
            .into_iter()
            .map(Self::personal_to_result)
            .collect();
        let knowledge: Vec<MemoryResult> = self
            .provider
            .search_knowledge(query, opts.knowledge_limit)
            .await?
            .into_iter()
            .map(Self::knowledge_to_result)
            .collect();
        let history = if opts.history_limit > 0 {
            self.history(opts.history_limit).await?
        } else {
            Vec::new()
        };
        let token_count = personal
            .iter()
            .chain(knowledge.iter())
            .map(|r| crate::prompt::estimate_tokens(&r.content))
            .chain(history.iter().map(|m| crate::prompt::estimate_tokens(&m.content)))
            .sum();
        let sources = if opts.include_sources {
            let mut sources: Vec<String> = personal
                .iter()
                .chain(knowledge.iter())
                .map(|r| r.source.clone())
                .collect();
            sources.sort();
            sources.dedup();
            sources
        } else {
            Vec::new()
        };
        Ok(RagContext {
            personal,
            knowledge,
            history,
            token_count,
            sources,
        })
    }

    fn new_session(&self) -> String {
        self.provider.create_session()
    }

    async fn set_session(&self, id: &str) -> Result<(), AgentError> {
        self.provider.select_session(id).await
    }

    async fn close(&self) -> Result<(), AgentError> {
        self.provider.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider;

    #[async_trait]
    impl MemoryProvider for FakeProvider {
        async fn store_entry(&self, _: &str, _: &str, _: &str) -> Result<(), AgentError> {
            Ok(())
        }

        async fn search_personal(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<PersonalRecord>, AgentError> {
            Ok(vec![PersonalRecord {
                text: "likes rust".into(),
                relevance: 1.4,
                tags: vec!["pref".into(), "lang".into()],
                created_at: Utc::now(),
            }])
        }

        async fn search_knowledge(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<KnowledgeRecord>, AgentError> {
            Ok(vec![KnowledgeRecord {
                text: "borrow checker rules".into(),
                relevance: 0.8,
                document_title: "rust book".into(),
                created_at: Utc::now(),
            }])
        }

        async fn append_message(&self, _: &str, _: &str) -> Result<(), AgentError> {
            Ok(())
        }

        async fn messages(&self, _limit: usize) -> Result<Vec<StoredMessage>, AgentError> {
            Ok(vec![StoredMessage {
                role: "user".into(),
                text: "hi".into(),
                created_at: Utc::now(),
            }])
        }

        async fn ingest(&self, _doc: Document) -> Result<(), AgentError> {
            Ok(())
        }
    }

    /// **Scenario**: adapter normalizes provider shapes into MemoryResult,
    /// clamping scores and tagging sources.
    #[tokio::test]
    async fn adapter_normalizes_records() {
        let adapter = ProviderAdapter::new(Arc::new(FakeProvider));
        let hits = adapter.query("rust", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "personal");
        assert_eq!(hits[0].score, 1.0, "relevance clamped to [0, 1]");
        assert_eq!(
            hits[0].metadata.get("tags").map(String::as_str),
            Some("pref,lang")
        );
    }

    /// **Scenario**: build_context merges personal and knowledge hits with
    /// deduplicated sources.
    #[tokio::test]
    async fn adapter_build_context_merges_sources() {
        let adapter = ProviderAdapter::new(Arc::new(FakeProvider));
        let ctx = adapter
            .build_context("rust", &ContextOptions::default())
            .await
            .unwrap();
        assert_eq!(ctx.personal.len(), 1);
        assert_eq!(ctx.knowledge.len(), 1);
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(
            ctx.sources,
            vec!["knowledge".to_string(), "personal".to_string()]
        );
        assert!(ctx.token_count > 0);
    }
}
