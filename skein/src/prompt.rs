//! Prompt enrichment: build the final system + user pair from raw input,
//! relevant memories, and chat history, under a token budget.
//!
//! Given identical memory responses and config this is a pure function of its
//! inputs; there is no hidden state. Memory failures degrade to the raw pair
//! with a warning unless the config asks for strict mode.

use tracing::warn;

use crate::config::MemoryConfig;
use crate::error::AgentError;
use crate::memory::{ChatMessage, Memory, MemoryResult, RagContext};

/// Estimated token count: `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Output of [`enrich`]: the final prompt pair plus the RAG snapshot and the
/// number of memory queries issued (attempted, whether or not they succeeded).
#[derive(Clone, Debug)]
pub struct EnrichedPrompt {
    pub system: String,
    pub user: String,
    pub rag_context: Option<RagContext>,
    pub memory_queries: usize,
}

impl EnrichedPrompt {
    fn plain(system: &str, input: &str, memory_queries: usize) -> Self {
        Self {
            system: system.to_string(),
            user: input.to_string(),
            rag_context: None,
            memory_queries,
        }
    }
}

/// Enriches `input` with personal memories and chat history.
///
/// The system prompt is never modified; the enriched user text is
/// `[chat history][RAG block]---\nUser Query\n\n{input}`.
pub async fn enrich(
    memory: Option<&dyn Memory>,
    config: &MemoryConfig,
    system: &str,
    input: &str,
) -> Result<EnrichedPrompt, AgentError> {
    let Some(memory) = memory else {
        return Ok(EnrichedPrompt::plain(system, input, 0));
    };

    let mut queries = 0;

    queries += 1;
    let hits = match memory.query(input, config.history_limit).await {
        Ok(hits) => hits,
        Err(e) if config.strict => return Err(e),
        Err(e) => {
            warn!(error = %e, "memory query failed, using unenriched prompt");
            return Ok(EnrichedPrompt::plain(system, input, queries));
        }
    };

    let rag_block = match &config.rag {
        Some(rag) => format_rag_block(&hits, rag.max_tokens),
        None => String::new(),
    };

    let history = if config.history_limit > 0 {
        queries += 1;
        match memory.history(config.history_limit).await {
            Ok(history) => history,
            Err(e) if config.strict => return Err(e),
            Err(e) => {
                warn!(error = %e, "chat history fetch failed, continuing without it");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };
    let history_block = format_history_block(&history);

    let user = format!("{history_block}{rag_block}---\nUser Query\n\n{input}");

    let token_count = estimate_tokens(&history_block) + estimate_tokens(&rag_block);
    let mut sources: Vec<String> = hits.iter().map(|h| h.source.clone()).collect();
    sources.sort();
    sources.dedup();
    let include_sources = config.rag.as_ref().map(|r| r.include_sources).unwrap_or(false);

    Ok(EnrichedPrompt {
        system: system.to_string(),
        user,
        rag_context: Some(RagContext {
            personal: hits,
            knowledge: Vec::new(),
            history,
            token_count,
            sources: if include_sources { sources } else { Vec::new() },
        }),
        memory_queries: queries,
    })
}

/// Formats memory hits as a scored list, truncated to `max_tokens`.
fn format_rag_block(hits: &[MemoryResult], max_tokens: usize) -> String {
    if hits.is_empty() {
        return String::new();
    }
    let header = "Relevant context from memory:\n";
    let mut block = String::from(header);
    let mut budget = max_tokens.saturating_sub(estimate_tokens(header));
    for hit in hits {
        let mut line = format!("- [relevance {:.2}] {}", hit.score, hit.content);
        if let Some(tags) = hit.metadata.get("tags") {
            line.push_str(&format!(" (tags: {tags})"));
        }
        line.push('\n');
        let cost = estimate_tokens(&line);
        if cost > budget {
            break;
        }
        budget -= cost;
        block.push_str(&line);
    }
    block.push('\n');
    block
}

/// Formats the last chat turns as `Role: content` lines.
fn format_history_block(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut block = String::from("Recent conversation:\n");
    for message in history {
        let mut role = message.role.clone();
        if let Some(first) = role.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        block.push_str(&format!("{role}: {}\n", message.content));
    }
    block.push('\n');
    block
}
