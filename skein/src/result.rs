//! Run results and the records that make them up.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::RagContext;

/// Token usage for one LLM call (prompt + completion).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Record of one executed (or failed) tool call.
///
/// `success == true` implies `error` is empty; on failure `result` may be
/// absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub duration: Duration,
    pub success: bool,
    #[serde(default)]
    pub error: String,
}

impl ToolCallRecord {
    pub fn succeeded(
        name: impl Into<String>,
        arguments: HashMap<String, Value>,
        result: Value,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            result: Some(result),
            duration,
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(
        name: impl Into<String>,
        arguments: HashMap<String, Value>,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            arguments,
            result: None,
            duration,
            success: false,
            error: error.into(),
        }
    }
}

/// Flattened view of a tool call for detailed results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolExecution {
    pub name: String,
    pub arguments: HashMap<String, Value>,
    pub output: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl From<&ToolCallRecord> for ToolExecution {
    fn from(record: &ToolCallRecord) -> Self {
        let output = if record.success {
            record
                .result
                .as_ref()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default()
        } else {
            record.error.clone()
        };
        Self {
            name: record.name.clone(),
            arguments: record.arguments.clone(),
            output,
            duration_ms: record.duration.as_millis() as u64,
            success: record.success,
        }
    }
}

/// Record of one LLM round-trip within a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmInteraction {
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: String,
    pub duration: Duration,
}

/// Outcome of one agent run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    /// Final text produced by the run.
    pub content: String,
    pub duration: Duration,
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    /// Populated when `RunOptions::detailed_result` is set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_executions: Vec<ToolExecution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub llm_interactions: Vec<LlmInteraction>,
    pub memory_used: bool,
    pub memory_queries: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_context: Option<RagContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl RunResult {
    /// A successful result with the given content; timestamps both `now`.
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            success: true,
            content: content.into(),
            duration: Duration::ZERO,
            usage: TokenUsage::default(),
            tool_calls: Vec::new(),
            tool_executions: Vec::new(),
            llm_interactions: Vec::new(),
            memory_used: false,
            memory_queries: 0,
            rag_context: None,
            session_id: None,
            trace_id: None,
            started_at: now,
            finished_at: now,
            metadata: HashMap::new(),
        }
    }

    /// Stamps `finished_at = now` and recomputes `duration` from `started_at`.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        self.duration = (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }

    /// Total tokens across all LLM interactions in this run.
    pub fn tokens_used(&self) -> u32 {
        self.usage.total_tokens
    }
}
