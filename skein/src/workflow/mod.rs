//! Workflows: schedulers over agent steps.
//!
//! A [`Workflow`] runs its steps under one of four modes (sequential,
//! parallel, DAG, bounded loop), producing a single [`WorkflowResult`],
//! or a single outer chunk stream in the streaming case. Workflows compose:
//! [`SubWorkflowAgent`](crate::subworkflow::SubWorkflowAgent) exposes a
//! workflow through the agent contract so it can be a step of another
//! workflow.

mod config;
mod context;
mod engine;
mod step;
mod streaming;

pub mod result;

pub use config::{WorkflowConfig, WorkflowMode, DEFAULT_LOOP_ITERATIONS};
pub use context::{ContextSnapshot, WorkflowContext};
pub use engine::Workflow;
pub use result::{StepResult, WorkflowResult};
pub use step::{InputTransform, StepPredicate, WorkflowStep};
