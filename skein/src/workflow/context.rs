//! Shared per-run workflow context.
//!
//! One reader/writer lock guards the variable map, step results, current step
//! and iteration number. Writers are step completion and `set_variable`;
//! readers are predicate evaluation and dependency resolution, which see a
//! cloned [`ContextSnapshot`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::memory::Memory;
use crate::workflow::result::StepResult;

#[derive(Default)]
struct ContextInner {
    step_results: HashMap<String, StepResult>,
    variables: HashMap<String, Value>,
    current_step: String,
    iteration: usize,
}

/// Read-only view of the context at one point in time, handed to predicates.
#[derive(Clone, Debug)]
pub struct ContextSnapshot {
    pub workflow_id: String,
    pub step_results: HashMap<String, StepResult>,
    pub variables: HashMap<String, Value>,
    pub current_step: String,
    pub iteration: usize,
}

impl ContextSnapshot {
    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn step_result(&self, name: &str) -> Option<&StepResult> {
        self.step_results.get(name)
    }
}

/// Shared mutable state for one workflow run.
///
/// Exposed to step agents through
/// [`RunContext::workflow`](crate::traits::RunContext); a step may set
/// variables (e.g. `loop_continue`) that the engine reads between passes.
pub struct WorkflowContext {
    workflow_id: String,
    inner: RwLock<ContextInner>,
    memory: Option<Arc<dyn Memory>>,
}

impl WorkflowContext {
    pub fn new(workflow_id: impl Into<String>, memory: Option<Arc<dyn Memory>>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            inner: RwLock::new(ContextInner::default()),
            memory,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn memory(&self) -> Option<Arc<dyn Memory>> {
        self.memory.clone()
    }

    pub async fn set_variable(&self, key: impl Into<String>, value: Value) {
        self.inner.write().await.variables.insert(key.into(), value);
    }

    pub async fn variable(&self, key: &str) -> Option<Value> {
        self.inner.read().await.variables.get(key).cloned()
    }

    pub async fn set_current_step(&self, name: &str) {
        self.inner.write().await.current_step = name.to_string();
    }

    pub async fn set_iteration(&self, iteration: usize) {
        self.inner.write().await.iteration = iteration;
    }

    pub async fn insert_step_result(&self, result: StepResult) {
        self.inner
            .write()
            .await
            .step_results
            .insert(result.name.clone(), result);
    }

    pub async fn step_result(&self, name: &str) -> Option<StepResult> {
        self.inner.read().await.step_results.get(name).cloned()
    }

    pub async fn snapshot(&self) -> ContextSnapshot {
        let inner = self.inner.read().await;
        ContextSnapshot {
            workflow_id: self.workflow_id.clone(),
            step_results: inner.step_results.clone(),
            variables: inner.variables.clone(),
            current_step: inner.current_step.clone(),
            iteration: inner.iteration,
        }
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("workflow_id", &self.workflow_id)
            .field("has_memory", &self.memory.is_some())
            .finish()
    }
}
