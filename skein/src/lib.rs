//! # Skein
//!
//! The execution core of a streaming multi-agent orchestration framework:
//! turn a declarative description of agents (an LLM endpoint plus optional
//! tools and memory) into a running, streaming, composable execution graph.
//!
//! ## Design principles
//!
//! - **Agents are the unit of execution**: [`Agent`] exposes `run` /
//!   `run_stream`; [`LlmAgent`] implements the full loop (prompt enrichment,
//!   LLM call, bounded agentic tool loop, memory writeback).
//! - **Everything streams**: one typed chunk channel ([`ChunkStream`])
//!   carries deltas, thoughts, tool activity, lifecycle markers, and a
//!   terminal result from nested producers to a single consumer, with
//!   cancellation and filtering.
//! - **Workflows compose**: [`Workflow`] schedules steps sequentially, in
//!   parallel, over a DAG, or in a bounded loop; a workflow wrapped in
//!   [`SubWorkflowAgent`] is itself an agent, recursively, up to a depth
//!   bound.
//! - **External collaborators stay external**: LLM wire protocols, vector
//!   stores, and tool transports live behind the [`LlmClient`], [`Memory`],
//!   and [`Tool`] traits.
//!
//! ## Main modules
//!
//! - [`traits`]: [`Agent`] contract and [`RunContext`].
//! - [`agent`]: [`LlmAgent`], [`AgentBuilder`], [`presets`](agent::presets).
//! - [`workflow`]: [`Workflow`], [`WorkflowStep`], [`WorkflowContext`],
//!   the four execution modes, streaming execution.
//! - [`subworkflow`]: [`SubWorkflowAgent`] with the recursion bound.
//! - [`stream`]: [`ChunkStream`] / [`ChunkWriter`] over the
//!   [`stream_chunk`] protocol types.
//! - [`llm`]: [`LlmClient`] trait, [`MockLlm`].
//! - [`memory`]: [`Memory`] trait, [`InMemoryMemory`], provider adapter.
//! - [`tools`]: [`Tool`] trait, [`ToolRegistry`], executor.
//! - [`toolcall`]: tool invocation parser (tagged JSON, function-style,
//!   ReAct).
//! - [`prompt`]: memory-backed prompt enrichment under a token budget.
//! - [`config`] / [`options`] / [`result`] / [`error`]: shared value types.
//!
//! Key types are re-exported at the crate root:
//! `use skein::{Agent, LlmAgent, Workflow, WorkflowStep, ChunkStream};`

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod options;
pub mod prompt;
pub mod result;
pub mod stream;
pub mod subworkflow;
pub mod toolcall;
pub mod tools;
pub mod traits;
pub mod workflow;

pub use agent::{
    AgentBuilder, AgentMetrics, HandlerBridge, LlmAgent, PresetRegistry, ResponseHandler,
};
pub use config::{
    AgentConfig, LlmConfig, MemoryConfig, RagConfig, ToolConfig, DEFAULT_HISTORY_LIMIT,
    DEFAULT_RAG_TOKENS, DEFAULT_TOOL_ITERATIONS,
};
pub use error::{AgentError, ErrorKind};
pub use llm::{LlmClient, LlmReply, MockLlm, Prompt, TokenChunk};
pub use memory::{
    ChatMessage, ContextOptions, Document, InMemoryMemory, Memory, MemoryProvider, MemoryResult,
    ProviderAdapter, RagContext,
};
pub use options::{
    Attachment, ChunkHandler, RunOptions, StreamOptions, ToolMode, DEFAULT_BUFFER_CAPACITY,
};
pub use result::{LlmInteraction, RunResult, TokenUsage, ToolCallRecord, ToolExecution};
pub use stream::{ChunkStream, ChunkWriter};
pub use subworkflow::{SubWorkflowAgent, DEFAULT_MAX_DEPTH};
pub use toolcall::{parse_tool_calls, ParsedToolCall};
pub use tools::{execute_call, Tool, ToolMetrics, ToolOutput, ToolRegistry};
pub use traits::{Agent, RunContext};
pub use workflow::{
    ContextSnapshot, StepResult, Workflow, WorkflowConfig, WorkflowContext, WorkflowMode,
    WorkflowResult, WorkflowStep, DEFAULT_LOOP_ITERATIONS,
};

// Protocol types re-exported so downstream crates need only one import.
pub use stream_chunk::{Chunk, ChunkData, ChunkError, ChunkKind, MediaDescriptor, StreamMetadata};
