//! Sub-workflow wrapper: a [`Workflow`] behind the [`Agent`] contract.
//!
//! Lets a workflow appear as a step inside another workflow. Each wrapper
//! carries its nesting depth and path; a run at `depth >= max_depth` fails
//! with `recursion_limit` naming the full `parent/child/...` path before any
//! inner agent is invoked.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::{AgentConfig, LlmConfig};
use crate::error::AgentError;
use crate::options::{RunOptions, StreamOptions};
use crate::result::{RunResult, TokenUsage};
use crate::stream::ChunkStream;
use crate::traits::{Agent, RunContext};
use crate::workflow::Workflow;

/// Default nesting bound.
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Default)]
struct ExecStats {
    count: u64,
    total: Duration,
}

/// Adapts a workflow to the agent contract.
pub struct SubWorkflowAgent {
    name: String,
    workflow: Arc<Workflow>,
    config: AgentConfig,
    description: String,
    parent_path: String,
    depth: usize,
    max_depth: usize,
    executions: Mutex<ExecStats>,
}

impl SubWorkflowAgent {
    pub fn new(name: impl Into<String>, workflow: Arc<Workflow>) -> Self {
        let name = name.into();
        let config = AgentConfig::new(
            &name,
            LlmConfig::new("workflow", workflow.config().mode.as_str()),
        )
        .with_workflow(workflow.config().clone());
        Self {
            name,
            workflow,
            config,
            description: String::new(),
            parent_path: String::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            executions: Mutex::new(ExecStats::default()),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self.config.system_prompt = self.description.clone();
        self
    }

    pub fn with_parent_path(mut self, parent_path: impl Into<String>) -> Self {
        self.parent_path = parent_path.into();
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Full nesting path, `parent_path/name`.
    pub fn path(&self) -> String {
        if self.parent_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.parent_path, self.name)
        }
    }

    fn check_depth(&self) -> Result<(), AgentError> {
        if self.depth >= self.max_depth {
            return Err(AgentError::RecursionLimit {
                path: self.path(),
                depth: self.depth,
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    /// Child context carrying the nesting path and depth for the inner run.
    fn nested_context(&self, ctx: &RunContext) -> RunContext {
        ctx.child()
            .with_value("subworkflow_path", Value::String(self.path()))
            .with_value("subworkflow_depth", Value::from(self.depth as u64))
    }
}

#[async_trait]
impl Agent for SubWorkflowAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn capabilities(&self) -> Vec<String> {
        vec![
            "workflow_execution".to_string(),
            "workflow_composition".to_string(),
            self.workflow.config().mode.as_str().to_string(),
            "streaming".to_string(),
        ]
    }

    async fn initialize(&self) -> Result<(), AgentError> {
        self.workflow.initialize().await
    }

    async fn cleanup(&self) -> Result<(), AgentError> {
        self.workflow.shutdown().await
    }

    async fn run_with_options(
        &self,
        ctx: &RunContext,
        input: &str,
        _options: RunOptions,
    ) -> Result<RunResult, AgentError> {
        self.check_depth()?;
        let sub_ctx = self.nested_context(ctx);
        let started = Instant::now();
        let workflow_result = self.workflow.run(&sub_ctx, input).await?;

        let (count, avg) = {
            let mut stats = self.executions.lock().expect("subworkflow stats lock");
            stats.count += 1;
            stats.total += started.elapsed();
            (stats.count, stats.total / stats.count as u32)
        };

        let mut result = RunResult::new(workflow_result.final_output.clone());
        result.success = workflow_result.success;
        result.usage = TokenUsage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: workflow_result.total_tokens,
        };
        result.metadata.insert("type".into(), json!("subworkflow"));
        result
            .metadata
            .insert("workflow_name".into(), json!(self.workflow.config().name));
        result
            .metadata
            .insert("workflow_path".into(), json!(self.path()));
        result.metadata.insert("depth".into(), json!(self.depth));
        result
            .metadata
            .insert("step_count".into(), json!(self.workflow.steps().len()));
        result.metadata.insert(
            "execution_path".into(),
            json!(workflow_result.execution_path),
        );
        result.metadata.insert(
            "workflow_duration_ms".into(),
            json!(workflow_result.duration.as_millis() as u64),
        );
        result.metadata.insert("execution_count".into(), json!(count));
        result
            .metadata
            .insert("avg_duration_ms".into(), json!(avg.as_millis() as u64));
        if let Some(error) = &workflow_result.error {
            result.metadata.insert("error".into(), json!(error));
        }
        result.finish();
        Ok(result)
    }

    /// Streams the inner workflow, tagging every chunk with the wrapper's
    /// path and depth. Chunks are owned values here, so the enrichment
    /// mutates a private map; indices and order pass through untouched.
    async fn run_stream(
        &self,
        ctx: &RunContext,
        input: &str,
        options: StreamOptions,
    ) -> Result<ChunkStream, AgentError> {
        self.check_depth()?;
        let sub_ctx = self.nested_context(ctx);
        let inner = self.workflow.run_stream(&sub_ctx, input, options).await?;
        let parent = self.name.clone();
        let path = self.path();
        let depth = self.depth;
        Ok(ChunkStream::wrap(inner, move |chunk| {
            chunk
                .metadata
                .insert("parent_subworkflow".to_string(), parent.clone());
            chunk
                .metadata
                .insert("subworkflow_path".to_string(), path.clone());
            chunk
                .metadata
                .insert("subworkflow_depth".to_string(), depth.to_string());
        }))
    }
}
