//! Ordered tool registry with per-tool metrics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::AgentError;
use crate::tools::Tool;

/// Invocation counters for one tool.
#[derive(Clone, Debug, Default)]
pub struct ToolMetrics {
    pub invocations: u64,
    pub failures: u64,
    pub total_duration: Duration,
}

/// Holds tools in registration order. Lookup is first exact name match.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<dyn Tool>>>,
    metrics: RwLock<HashMap<String, ToolMetrics>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool; duplicate names are rejected.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let mut tools = self.tools.write().expect("tool registry lock");
        if tools.iter().any(|t| t.name() == tool.name()) {
            return Err(AgentError::ConfigInvalid(format!(
                "duplicate tool name: {}",
                tool.name()
            )));
        }
        tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock")
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    /// All tools in registration order.
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().expect("tool registry lock").clone()
    }

    /// `(name, description)` pairs in registration order.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .read()
            .expect("tool registry lock")
            .iter()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().expect("tool registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Updates the metrics for one tool after an execution.
    pub fn record(&self, name: &str, success: bool, duration: Duration) {
        let mut metrics = self.metrics.write().expect("tool metrics lock");
        let entry = metrics.entry(name.to_string()).or_default();
        entry.invocations += 1;
        if !success {
            entry.failures += 1;
        }
        entry.total_duration += duration;
    }

    pub fn metrics(&self, name: &str) -> Option<ToolMetrics> {
        self.metrics
            .read()
            .expect("tool metrics lock")
            .get(name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::HashMap;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "a test tool"
        }
        async fn execute(
            &self,
            _args: &HashMap<String, Value>,
        ) -> Result<ToolOutput, AgentError> {
            Ok(ToolOutput::ok("done"))
        }
    }

    #[test]
    fn register_and_lookup_preserves_order() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("a"))).unwrap();
        registry.register(Arc::new(NamedTool("b"))).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("missing").is_none());
        let names: Vec<String> = registry
            .descriptions()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("a"))).unwrap();
        let err = registry.register(Arc::new(NamedTool("a"))).unwrap_err();
        assert_eq!(err.kind().as_str(), "config_invalid");
    }

    #[test]
    fn metrics_accumulate() {
        let registry = ToolRegistry::new();
        registry.record("a", true, Duration::from_millis(5));
        registry.record("a", false, Duration::from_millis(3));
        let m = registry.metrics("a").unwrap();
        assert_eq!(m.invocations, 2);
        assert_eq!(m.failures, 1);
        assert_eq!(m.total_duration, Duration::from_millis(8));
        assert!(registry.metrics("b").is_none());
    }
}
