//! LLM client abstraction.
//!
//! The agent loop depends on a callable that turns a prompt into assistant
//! text plus token usage; this module defines the trait and a scripted mock.
//! Wire protocols (OpenAI, Anthropic, ...) live behind this boundary and are
//! out of scope for the core.
//!
//! # Streaming
//!
//! The trait supports streaming via `complete_stream()`, which accepts an
//! optional `Sender<TokenChunk>` for emitting tokens as they arrive.
//! Implementations that stream natively send chunks through the channel; the
//! default implementation calls `complete()` and sends the full content as
//! one chunk.

mod mock;

pub use mock::MockLlm;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::options::Attachment;
use crate::result::TokenUsage;

/// One prompt for an LLM call: system + user text plus call parameters.
#[derive(Clone, Debug, Default)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub attachments: Vec<Attachment>,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            ..Self::default()
        }
    }
}

/// One streamed token span.
#[derive(Clone, Debug)]
pub struct TokenChunk {
    pub content: String,
}

/// Response from one LLM completion.
#[derive(Clone, Debug)]
pub struct LlmReply {
    pub content: String,
    /// Provider finish reason, e.g. `stop` or `length`.
    pub finish_reason: String,
    pub usage: TokenUsage,
}

/// LLM client: given a prompt, returns assistant text and usage.
///
/// Implementations must map credential and quota failures to
/// [`AgentError::LlmAuth`] / [`AgentError::LlmQuota`] so callers can classify
/// them as fatal; transport and server errors map to [`AgentError::LlmCall`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One-shot completion.
    async fn complete(&self, prompt: &Prompt) -> Result<LlmReply, AgentError>;

    /// Streaming variant: when `chunk_tx` is `Some`, send [`TokenChunk`]s as
    /// they arrive, then return the complete reply.
    ///
    /// Default implementation calls `complete()` and sends the full content
    /// as a single chunk.
    async fn complete_stream(
        &self,
        prompt: &Prompt,
        chunk_tx: Option<mpsc::Sender<TokenChunk>>,
    ) -> Result<LlmReply, AgentError> {
        let reply = self.complete(prompt).await?;
        if let Some(tx) = chunk_tx {
            if !reply.content.is_empty() {
                let _ = tx
                    .send(TokenChunk {
                        content: reply.content.clone(),
                    })
                    .await;
            }
        }
        Ok(reply)
    }
}
