//! Fluent agent builder with frozen-on-build semantics.
//!
//! After a successful `build()` the builder is frozen: further mutators and
//! repeat builds return `config_invalid`. `clone_open()` produces a fresh
//! open builder with a deep-copied configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::llm_agent::{LlmAgent, ResponseHandler};
use crate::agent::HandlerBridge;
use crate::config::{AgentConfig, LlmConfig, MemoryConfig, ToolConfig};
use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::memory::Memory;
use crate::tools::Tool;

pub struct AgentBuilder {
    config: AgentConfig,
    llm: Option<Arc<dyn LlmClient>>,
    memory: Option<Arc<dyn Memory>>,
    tools: Vec<Arc<dyn Tool>>,
    handler: Option<ResponseHandler>,
    frozen: bool,
}

impl std::fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("config", &self.config)
            .field("has_llm", &self.llm.is_some())
            .field("has_memory", &self.memory.is_some())
            .field("tool_count", &self.tools.len())
            .field("has_handler", &self.handler.is_some())
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(AgentConfig::new(name, LlmConfig::new("", "")))
    }

    /// Starts from an existing config (e.g. a preset).
    pub fn from_config(config: AgentConfig) -> Self {
        Self {
            config,
            llm: None,
            memory: None,
            tools: Vec::new(),
            handler: None,
            frozen: false,
        }
    }

    fn guard(&self) -> Result<(), AgentError> {
        if self.frozen {
            return Err(AgentError::ConfigInvalid(
                "builder is frozen after build".into(),
            ));
        }
        Ok(())
    }

    pub fn system_prompt(&mut self, prompt: impl Into<String>) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.config.system_prompt = prompt.into();
        Ok(self)
    }

    pub fn timeout(&mut self, timeout: Duration) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.config.timeout = Some(timeout);
        Ok(self)
    }

    pub fn llm_config(&mut self, llm: LlmConfig) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.config.llm = llm;
        Ok(self)
    }

    pub fn memory_config(&mut self, memory: MemoryConfig) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.config.memory = Some(memory);
        Ok(self)
    }

    pub fn tool_config(&mut self, tools: ToolConfig) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.config.tools = Some(tools);
        Ok(self)
    }

    pub fn llm(&mut self, llm: Arc<dyn LlmClient>) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.llm = Some(llm);
        Ok(self)
    }

    pub fn memory(&mut self, memory: Arc<dyn Memory>) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.memory = Some(memory);
        // Memory without a memory config gets the defaults.
        if self.config.memory.is_none() {
            self.config.memory = Some(MemoryConfig::default());
        }
        Ok(self)
    }

    pub fn tool(&mut self, tool: Arc<dyn Tool>) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.tools.push(tool);
        if self.config.tools.is_none() {
            self.config.tools = Some(ToolConfig::default());
        }
        Ok(self)
    }

    pub fn handler(
        &mut self,
        handler: impl Fn(&str, &HandlerBridge) -> Result<String, AgentError> + Send + Sync + 'static,
    ) -> Result<&mut Self, AgentError> {
        self.guard()?;
        self.handler = Some(Arc::new(handler));
        Ok(self)
    }

    /// Validates and assembles the agent, then freezes this builder.
    pub fn build(&mut self) -> Result<LlmAgent, AgentError> {
        self.guard()?;
        let agent = LlmAgent::assemble(
            self.config.clone(),
            self.llm.clone(),
            self.memory.clone(),
            self.tools.clone(),
            self.handler.clone(),
        )?;
        self.frozen = true;
        Ok(agent)
    }

    /// A fresh open builder with the same configuration and wiring.
    pub fn clone_open(&self) -> AgentBuilder {
        AgentBuilder {
            config: self.config.clone(),
            llm: self.llm.clone(),
            memory: self.memory.clone(),
            tools: self.tools.clone(),
            handler: self.handler.clone(),
            frozen: false,
        }
    }
}
