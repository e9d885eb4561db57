//! Named starting configurations and a user-extensible preset registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::{AgentConfig, LlmConfig, MemoryConfig, RagConfig, ToolConfig};
use crate::workflow::{WorkflowConfig, WorkflowMode};

/// Conversational default: higher temperature, small memory window.
pub fn chat(name: &str) -> AgentConfig {
    AgentConfig::new(
        name,
        LlmConfig::new("openai", "gpt-4o-mini")
            .with_temperature(0.9)
            .with_max_tokens(1024),
    )
    .with_timeout(Duration::from_secs(30))
    .with_memory(MemoryConfig {
        history_limit: 3,
        rag: Some(RagConfig::default()),
        strict: false,
    })
}

/// Research default: low temperature, large token budget, tools, long timeout.
pub fn research(name: &str) -> AgentConfig {
    AgentConfig::new(
        name,
        LlmConfig::new("openai", "gpt-4o")
            .with_temperature(0.2)
            .with_max_tokens(4096),
    )
    .with_timeout(Duration::from_secs(120))
    .with_memory(MemoryConfig {
        history_limit: 5,
        rag: Some(RagConfig {
            max_tokens: 4000,
            include_sources: true,
        }),
        strict: false,
    })
    .with_tools(ToolConfig::default())
}

/// Data-processing default: deterministic output, tools, moderate timeout.
pub fn data(name: &str) -> AgentConfig {
    AgentConfig::new(
        name,
        LlmConfig::new("openai", "gpt-4o")
            .with_temperature(0.0)
            .with_max_tokens(2048),
    )
    .with_timeout(Duration::from_secs(60))
    .with_tools(ToolConfig::default())
}

/// Workflow default: a sequential workflow carrier.
pub fn workflow(name: &str) -> AgentConfig {
    AgentConfig::new(
        name,
        LlmConfig::new("openai", "gpt-4o-mini").with_temperature(0.3),
    )
    .with_workflow(WorkflowConfig::new(name, WorkflowMode::Sequential))
}

/// Factory producing a config for a given agent name.
pub type PresetFn = Arc<dyn Fn(&str) -> AgentConfig + Send + Sync>;

/// Lock-guarded, injectable preset registry. Not a process-wide singleton;
/// construct one at the initialization root and pass it down.
#[derive(Default)]
pub struct PresetRegistry {
    presets: RwLock<HashMap<String, PresetFn>>,
    defaults_installed: AtomicBool,
}

impl PresetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the four built-in presets installed.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.initialize_defaults();
        registry
    }

    /// Installs `chat`, `research`, `data`, and `workflow`. Idempotent.
    pub fn initialize_defaults(&self) {
        if self.defaults_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.register("chat", chat);
        self.register("research", research);
        self.register("data", data);
        self.register("workflow", workflow);
    }

    pub fn register(
        &self,
        preset: impl Into<String>,
        f: impl Fn(&str) -> AgentConfig + Send + Sync + 'static,
    ) {
        self.presets
            .write()
            .expect("preset registry lock")
            .insert(preset.into(), Arc::new(f));
    }

    /// Builds a config for `agent_name` from the named preset.
    pub fn build(&self, preset: &str, agent_name: &str) -> Option<AgentConfig> {
        let f = self
            .presets
            .read()
            .expect("preset registry lock")
            .get(preset)
            .cloned()?;
        Some(f(agent_name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .presets
            .read()
            .expect("preset registry lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_presets_have_expected_shape() {
        let c = chat("talker");
        assert_eq!(c.name, "talker");
        assert_eq!(c.llm.temperature, Some(0.9));
        assert_eq!(c.memory.as_ref().unwrap().history_limit, 3);
        assert!(c.tools.is_none());

        let r = research("digger");
        assert_eq!(r.llm.temperature, Some(0.2));
        assert!(r.tools.is_some());
        assert_eq!(r.memory.as_ref().unwrap().rag.as_ref().unwrap().max_tokens, 4000);
        assert!(r.timeout.unwrap() > c.timeout.unwrap());

        let d = data("cruncher");
        assert_eq!(d.llm.temperature, Some(0.0));
        assert!(d.tools.is_some());

        let w = workflow("pipeline");
        assert_eq!(
            w.workflow.as_ref().unwrap().mode,
            WorkflowMode::Sequential
        );
    }

    #[test]
    fn registry_registers_and_builds() {
        let registry = PresetRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec!["chat", "data", "research", "workflow"]
        );
        let c = registry.build("chat", "talker").unwrap();
        assert_eq!(c.name, "talker");
        assert!(registry.build("missing", "x").is_none());
    }

    /// **Scenario**: initialize_defaults is idempotent and does not clobber
    /// user overrides registered after the first install.
    #[test]
    fn initialize_defaults_is_idempotent() {
        let registry = PresetRegistry::new();
        registry.initialize_defaults();
        registry.register("chat", |name| {
            AgentConfig::new(name, LlmConfig::new("custom", "model-x"))
        });
        registry.initialize_defaults();
        let c = registry.build("chat", "talker").unwrap();
        assert_eq!(c.llm.provider, "custom");
    }

    #[test]
    fn custom_presets_register() {
        let registry = PresetRegistry::new();
        registry.register("tiny", |name| {
            AgentConfig::new(name, LlmConfig::new("mock", "tiny-model"))
        });
        let c = registry.build("tiny", "t").unwrap();
        assert_eq!(c.llm.model, "tiny-model");
    }
}
