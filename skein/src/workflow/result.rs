//! Workflow and step results.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::result::RunResult;

/// Outcome of one step within a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub output: String,
    pub duration: Duration,
    pub tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub skipped: bool,
    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    /// A step whose predicate returned false.
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            output: String::new(),
            duration: Duration::ZERO,
            tokens: 0,
            error: None,
            skipped: true,
            timestamp: Utc::now(),
        }
    }

    /// A completed step carrying its agent result.
    pub fn from_run(name: impl Into<String>, run: &RunResult, duration: Duration) -> Self {
        Self {
            name: name.into(),
            success: run.success,
            output: run.content.clone(),
            duration,
            tokens: run.usage.total_tokens,
            error: run
                .metadata
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
            skipped: false,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(name: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            success: false,
            output: String::new(),
            duration,
            tokens: 0,
            error: Some(error.into()),
            skipped: false,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one workflow run. A partially successful run keeps every step
/// result collected up to the failure so callers can see which step failed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub success: bool,
    pub final_output: String,
    /// Per-step results in definition order (parallel) or execution order
    /// (sequential, DAG, loop).
    pub step_results: Vec<StepResult>,
    pub duration: Duration,
    pub total_tokens: u32,
    /// Names of executed (non-skipped) steps, in execution order.
    pub execution_path: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn succeeded(
        final_output: String,
        step_results: Vec<StepResult>,
        execution_path: Vec<String>,
        total_tokens: u32,
    ) -> Self {
        Self {
            success: true,
            final_output,
            step_results,
            duration: Duration::ZERO,
            total_tokens,
            execution_path,
            metadata: HashMap::new(),
            error: None,
        }
    }

    pub fn failed(
        final_output: String,
        step_results: Vec<StepResult>,
        execution_path: Vec<String>,
        total_tokens: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            final_output,
            step_results,
            duration: Duration::ZERO,
            total_tokens,
            execution_path,
            metadata: HashMap::new(),
            error: Some(error.into()),
        }
    }
}
