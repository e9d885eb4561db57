//! Tools: the callable capabilities an agent can hand to its LLM.
//!
//! Each tool exposes a unique name, a description (shown to the LLM), and an
//! `execute` implementation. Tools are held in an ordered [`ToolRegistry`];
//! the executor resolves parsed calls against that order (first exact name
//! match wins) and records each outcome as a [`ToolCallRecord`].

mod executor;
mod registry;

pub use executor::execute_call;
pub use registry::{ToolMetrics, ToolRegistry};

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

/// Result of one tool execution. `success == false` implies `error` is set.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub success: bool,
    pub content: String,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: String::new(),
            error: Some(error.into()),
        }
    }
}

/// A single callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name; used for lookup when the LLM invokes the tool.
    fn name(&self) -> &str;

    /// Short description shown to the LLM in the tool block.
    fn description(&self) -> &str;

    /// Runs the tool. Infrastructure failures go through `Err`; domain-level
    /// failures are reported in the returned [`ToolOutput`].
    async fn execute(&self, args: &HashMap<String, Value>) -> Result<ToolOutput, AgentError>;
}
