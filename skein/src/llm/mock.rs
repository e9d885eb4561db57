//! Scripted mock LLM for tests and examples.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::llm::{LlmClient, LlmReply, Prompt, TokenChunk};
use crate::result::TokenUsage;

/// Mock LLM that replays a fixed reply script.
///
/// Call `n` returns the `n`-th scripted reply; once the script is exhausted
/// the last reply repeats. An optional failure index makes a specific call
/// return [`AgentError::LlmCall`] instead, for testing mid-loop failures.
/// `calls()` exposes how many completions were requested.
pub struct MockLlm {
    replies: Vec<String>,
    usage: TokenUsage,
    fail_at: Option<usize>,
    fail_message: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl MockLlm {
    /// Same reply for every call.
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self::with_script(vec![reply.into()])
    }

    /// Replies in order; the last one repeats once exhausted.
    pub fn with_script(replies: Vec<String>) -> Self {
        Self {
            replies,
            usage: TokenUsage::new(5, 2),
            fail_at: None,
            fail_message: String::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Makes the 0-based `call` fail with `llm_call_failed`.
    pub fn failing_at(mut self, call: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some(call);
        self.fail_message = message.into();
        self
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, prompt: &Prompt) -> Result<LlmReply, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("prompts lock").push(prompt.clone());
        if self.fail_at == Some(call) {
            return Err(AgentError::LlmCall(self.fail_message.clone()));
        }
        let content = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();
        Ok(LlmReply {
            content,
            finish_reason: "stop".to_string(),
            usage: self.usage,
        })
    }

    /// Streams the reply word by word so delta forwarding is exercised.
    async fn complete_stream(
        &self,
        prompt: &Prompt,
        chunk_tx: Option<mpsc::Sender<TokenChunk>>,
    ) -> Result<LlmReply, AgentError> {
        let reply = self.complete(prompt).await?;
        if let Some(tx) = chunk_tx {
            let words: Vec<&str> = reply.content.split_inclusive(' ').collect();
            for word in words {
                let _ = tx
                    .send(TokenChunk {
                        content: word.to_string(),
                    })
                    .await;
            }
        }
        Ok(reply)
    }
}
