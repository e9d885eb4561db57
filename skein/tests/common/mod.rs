//! Shared stub agents for workflow and nesting tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use skein::{
    Agent, AgentConfig, AgentError, LlmConfig, RunContext, RunOptions, RunResult,
};

fn stub_config(name: &str) -> AgentConfig {
    AgentConfig::new(name, LlmConfig::new("stub", "stub-model"))
}

/// Echoes `input|name`, counting invocations.
pub struct EchoAgent {
    name: String,
    config: AgentConfig,
    calls: AtomicUsize,
}

impl EchoAgent {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            config: stub_config(name),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        &self.name
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RunResult::new(format!("{input}|{}", self.name)))
    }
}

/// Returns a fixed reply regardless of input.
pub struct FixedAgent {
    name: String,
    config: AgentConfig,
    reply: String,
}

impl FixedAgent {
    pub fn new(name: &str, reply: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            config: stub_config(name),
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl Agent for FixedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn run_with_options(
        &self,
        _ctx: &RunContext,
        _input: &str,
        _options: RunOptions,
    ) -> Result<RunResult, AgentError> {
        Ok(RunResult::new(self.reply.clone()))
    }
}

/// Always fails with `llm_call_failed` and the given message.
pub struct FailAgent {
    name: String,
    config: AgentConfig,
    message: String,
}

impl FailAgent {
    pub fn new(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            config: stub_config(name),
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl Agent for FailAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn run_with_options(
        &self,
        _ctx: &RunContext,
        _input: &str,
        _options: RunOptions,
    ) -> Result<RunResult, AgentError> {
        Err(AgentError::LlmCall(self.message.clone()))
    }
}

/// Sleeps until cancelled; used for cancellation-propagation tests.
pub struct SlowAgent {
    name: String,
    config: AgentConfig,
}

impl SlowAgent {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            config: stub_config(name),
        })
    }
}

#[async_trait]
impl Agent for SlowAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn run_with_options(
        &self,
        ctx: &RunContext,
        input: &str,
        _options: RunOptions,
    ) -> Result<RunResult, AgentError> {
        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(AgentError::Cancelled("slow agent cancelled".into())),
            _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {
                Ok(RunResult::new(format!("{input}|slow")))
            }
        }
    }
}
