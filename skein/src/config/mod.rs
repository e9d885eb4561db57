//! Typed agent configuration.
//!
//! [`AgentConfig`] is immutable after construction: an agent is built from it
//! and per-run overrides are applied to a cloned effective config, never back
//! into this one. Configuration *loading* (files, env) is out of scope; these
//! are the in-memory shapes the execution core consumes.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::workflow::WorkflowConfig;

/// Default cap on the agentic tool loop.
pub const DEFAULT_TOOL_ITERATIONS: usize = 5;
/// Default number of memory hits / chat turns pulled into a prompt.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;
/// Default token budget for the RAG block of an enriched prompt.
pub const DEFAULT_RAG_TOKENS: usize = 2000;

/// LLM sub-configuration: which model to call and with which parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }
}

/// RAG sub-configuration for prompt enrichment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RagConfig {
    /// Token budget for the formatted RAG block.
    pub max_tokens: usize,
    /// Whether to carry source tags into the result's RAG snapshot.
    pub include_sources: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_RAG_TOKENS,
            include_sources: true,
        }
    }
}

/// Memory sub-configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Max memory hits and chat turns pulled into a prompt.
    pub history_limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag: Option<RagConfig>,
    /// When false (default), memory failures degrade to the raw prompt with a
    /// warning. When true they surface as errors.
    #[serde(default)]
    pub strict: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            rag: Some(RagConfig::default()),
            strict: false,
        }
    }
}

/// Tool sub-configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Cap on the agentic tool loop (LLM → tools → LLM cycles).
    pub max_tool_iterations: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: DEFAULT_TOOL_ITERATIONS,
        }
    }
}

/// Full agent configuration. Immutable after construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    pub llm: LlmConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowConfig>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, llm: LlmConfig) -> Self {
        Self {
            name: name.into(),
            system_prompt: String::new(),
            timeout: None,
            llm,
            memory: None,
            tools: None,
            workflow: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_tools(mut self, tools: ToolConfig) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = Some(workflow);
        self
    }

    /// Checks construction-time invariants.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::ConfigMissing("agent name".into()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(AgentError::ConfigMissing("llm model".into()));
        }
        if let Some(t) = self.llm.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AgentError::ConfigInvalid(format!(
                    "temperature {t} outside [0, 2]"
                )));
            }
        }
        if let Some(tools) = &self.tools {
            if tools.max_tool_iterations == 0 {
                return Err(AgentError::ConfigInvalid(
                    "max_tool_iterations must be at least 1".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        AgentConfig::new("echo", LlmConfig::new("mock", "test-model"))
    }

    #[test]
    fn validate_accepts_minimal_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let c = AgentConfig::new("  ", LlmConfig::new("mock", "m"));
        let err = c.validate().unwrap_err();
        assert_eq!(err.kind().as_str(), "config_missing");
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let c = AgentConfig::new("a", LlmConfig::new("mock", "m").with_temperature(3.5));
        let err = c.validate().unwrap_err();
        assert_eq!(err.kind().as_str(), "config_invalid");
    }

    #[test]
    fn validate_rejects_zero_tool_iterations() {
        let c = config().with_tools(ToolConfig {
            max_tool_iterations: 0,
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn memory_defaults() {
        let m = MemoryConfig::default();
        assert_eq!(m.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(m.rag.unwrap().max_tokens, DEFAULT_RAG_TOKENS);
        assert!(!m.strict);
    }
}
