//! Core [`Agent`] trait and the per-run context.
//!
//! Everything that can be a workflow step implements `Agent`: LLM-backed
//! agents, sub-workflow wrappers, and test stubs. Agents without native
//! streaming inherit a fallback `run_stream` that wraps the one-shot result
//! into a single text chunk.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use stream_chunk::{ChunkData, StreamMetadata};
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::options::{RunOptions, StreamOptions};
use crate::result::RunResult;
use crate::stream::ChunkStream;

/// Per-run context: cancellation scope, session/trace ids, and free-form
/// values enriched by wrappers (sub-workflow path and depth live here).
/// Steps scheduled by a workflow additionally see the shared
/// [`WorkflowContext`](crate::workflow::WorkflowContext), e.g. to set
/// `loop_continue`.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    pub cancel: CancellationToken,
    pub session_id: Option<String>,
    pub trace_id: Option<String>,
    pub values: HashMap<String, Value>,
    pub workflow: Option<std::sync::Arc<crate::workflow::WorkflowContext>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Derived context: child cancellation scope, same ids and values.
    /// Cancelling the parent propagates to the child, not the reverse.
    pub fn child(&self) -> RunContext {
        RunContext {
            cancel: self.cancel.child_token(),
            session_id: self.session_id.clone(),
            trace_id: self.trace_id.clone(),
            values: self.values.clone(),
            workflow: self.workflow.clone(),
        }
    }
}

/// A unit exposing `run` / `run_stream`; internally an LLM plus optional
/// memory and tools, or a whole workflow behind the same contract.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> &AgentConfig;

    /// Capability strings, a subset of `{llm, memory, rag, tools, streaming,
    /// custom_handler, workflow_execution, workflow_composition, <mode>}`.
    fn capabilities(&self) -> Vec<String> {
        vec!["llm".to_string()]
    }

    /// Makes the agent usable; `run` before a successful `initialize` fails.
    async fn initialize(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AgentError> {
        Ok(())
    }

    async fn run(&self, ctx: &RunContext, input: &str) -> Result<RunResult, AgentError> {
        self.run_with_options(ctx, input, RunOptions::default())
            .await
    }

    async fn run_with_options(
        &self,
        ctx: &RunContext,
        input: &str,
        options: RunOptions,
    ) -> Result<RunResult, AgentError>;

    /// Streaming run. The default implementation runs one-shot and emits the
    /// result as a single `text` chunk followed by `done`, so every agent can
    /// be subscribed to by the streaming workflow engine.
    async fn run_stream(
        &self,
        ctx: &RunContext,
        input: &str,
        options: StreamOptions,
    ) -> Result<ChunkStream, AgentError> {
        let metadata = StreamMetadata::new(self.name())
            .with_model(self.config().llm.model.clone());
        // Room for text + done even with a tiny configured buffer, since the
        // fallback writes before any consumer is polling.
        let capacity = options.buffer_capacity.max(4);
        let options = options.with_buffer_capacity(capacity);
        let (stream, writer) = ChunkStream::channel(metadata, options, &ctx.cancel);
        match self.run(ctx, input).await {
            Ok(result) => {
                let _ = writer
                    .write(ChunkData::Text {
                        content: result.content.clone(),
                    })
                    .await;
                let _ = writer.write(ChunkData::Done).await;
                writer.set_result(result);
                writer.close();
            }
            Err(e) => {
                let _ = writer
                    .write(ChunkData::Error {
                        error: stream_chunk::ChunkError {
                            kind: e.kind().as_str().to_string(),
                            message: e.to_string(),
                            details: e.details(),
                        },
                    })
                    .await;
                writer.close_with_error(e);
            }
        }
        Ok(stream)
    }

    async fn run_stream_with_options(
        &self,
        ctx: &RunContext,
        input: &str,
        options: RunOptions,
    ) -> Result<ChunkStream, AgentError> {
        let stream_options = options.streaming.clone().unwrap_or_default();
        self.run_stream(ctx, input, stream_options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    struct Upper {
        config: AgentConfig,
    }

    impl Upper {
        fn new() -> Self {
            Self {
                config: AgentConfig::new("upper", LlmConfig::new("stub", "none")),
            }
        }
    }

    #[async_trait]
    impl Agent for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn config(&self) -> &AgentConfig {
            &self.config
        }
        async fn run_with_options(
            &self,
            _ctx: &RunContext,
            input: &str,
            _options: RunOptions,
        ) -> Result<RunResult, AgentError> {
            Ok(RunResult::new(input.to_uppercase()))
        }
    }

    /// **Scenario**: the fallback run_stream emits one text chunk, done, and
    /// a terminal result matching the one-shot output.
    #[tokio::test]
    async fn fallback_stream_wraps_one_shot_run() {
        let agent = Upper::new();
        let ctx = RunContext::new();
        let mut stream = agent
            .run_stream(&ctx, "hello", StreamOptions::default())
            .await
            .unwrap();

        let first = stream.recv().await.unwrap();
        assert_eq!(first.text_payload(), Some("HELLO"));
        let second = stream.recv().await.unwrap();
        assert!(second.is_terminal());
        assert!(stream.recv().await.is_none());

        let result = stream.wait().await.unwrap();
        assert_eq!(result.content, "HELLO");
    }

    /// **Scenario**: child contexts inherit values and cancel downward only.
    #[test]
    fn child_context_inherits_and_isolates_cancel() {
        let parent = RunContext::new()
            .with_session_id("s")
            .with_value("depth", Value::from(1));
        let child = parent.child();
        assert_eq!(child.session_id.as_deref(), Some("s"));
        assert_eq!(child.value("depth"), Some(&Value::from(1)));

        child.cancel.cancel();
        assert!(!parent.cancel.is_cancelled());

        let child2 = parent.child();
        parent.cancel.cancel();
        assert!(child2.cancel.is_cancelled());
    }
}
