//! Workflow steps: an agent plus optional predicate, dependencies, and input
//! transform.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;

use crate::traits::Agent;
use crate::workflow::context::ContextSnapshot;

/// Run/skip decision evaluated against the workflow context. Expected to be
/// side-effect-free; the engine may call it more than once in DAG mode.
pub type StepPredicate = Arc<dyn Fn(&ContextSnapshot) -> bool + Send + Sync>;

/// Pure transformation of a step's effective input.
pub type InputTransform = Arc<dyn Fn(String) -> String + Send + Sync>;

/// One step of a workflow. Names are unique within a workflow; `depends_on`
/// entries must name other steps of the same workflow (DAG mode).
#[derive(Clone)]
pub struct WorkflowStep {
    pub name: String,
    pub agent: Arc<dyn Agent>,
    pub predicate: Option<StepPredicate>,
    pub depends_on: Vec<String>,
    pub transform: Option<InputTransform>,
    pub metadata: HashMap<String, Value>,
}

impl WorkflowStep {
    pub fn new(name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: name.into(),
            agent,
            predicate: None,
            depends_on: Vec::new(),
            transform: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&ContextSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_depends_on(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Debug for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .field("has_predicate", &self.predicate.is_some())
            .field("depends_on", &self.depends_on)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}
