//! Workflow configuration: mode, timeout, loop bound.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default cap for loop-mode iterations.
pub const DEFAULT_LOOP_ITERATIONS: usize = 10;

/// Execution topology over the step list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowMode {
    /// Steps run in order; each output feeds the next step.
    Sequential,
    /// All steps run concurrently on the same input.
    Parallel,
    /// Steps run in dependency order; inputs join upstream outputs.
    Dag,
    /// The step list repeats until convergence, `loop_continue = false`, or
    /// the iteration cap.
    Loop,
}

impl WorkflowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowMode::Sequential => "sequential",
            WorkflowMode::Parallel => "parallel",
            WorkflowMode::Dag => "dag",
            WorkflowMode::Loop => "loop",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub name: String,
    pub mode: WorkflowMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// Loop-mode iteration cap; ignored by other modes.
    pub max_iterations: usize,
    /// When false (default), a loop that reaches its iteration cap completes
    /// normally with `terminated = "max_iterations"`. When true it surfaces
    /// as a `workflow_max_iterations` error instead.
    #[serde(default)]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl WorkflowConfig {
    pub fn new(name: impl Into<String>, mode: WorkflowMode) -> Self {
        Self {
            name: name.into(),
            mode,
            timeout: None,
            max_iterations: DEFAULT_LOOP_ITERATIONS,
            strict: false,
            metadata: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings() {
        assert_eq!(WorkflowMode::Sequential.as_str(), "sequential");
        assert_eq!(WorkflowMode::Parallel.as_str(), "parallel");
        assert_eq!(WorkflowMode::Dag.as_str(), "dag");
        assert_eq!(WorkflowMode::Loop.as_str(), "loop");
    }

    #[test]
    fn defaults_and_builders() {
        let c = WorkflowConfig::new("pipeline", WorkflowMode::Loop)
            .with_timeout(Duration::from_secs(5))
            .with_max_iterations(0)
            .with_strict(true);
        assert_eq!(c.max_iterations, 1, "cap has a floor of one");
        assert_eq!(c.timeout, Some(Duration::from_secs(5)));
        assert!(c.strict);
        let defaults = WorkflowConfig::new("p", WorkflowMode::Sequential);
        assert_eq!(defaults.max_iterations, DEFAULT_LOOP_ITERATIONS);
        assert!(!defaults.strict);
    }
}
