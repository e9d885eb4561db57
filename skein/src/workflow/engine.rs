//! The workflow engine: sequential, parallel, DAG, and loop schedulers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::error::AgentError;
use crate::memory::Memory;
use crate::traits::RunContext;
use crate::workflow::config::{WorkflowConfig, WorkflowMode};
use crate::workflow::context::WorkflowContext;
use crate::workflow::result::{StepResult, WorkflowResult};
use crate::workflow::step::WorkflowStep;

/// Outcome of one scheduled step.
pub(crate) enum StepOutcome {
    Skipped(StepResult),
    Completed(StepResult),
    Failed(StepResult, AgentError),
}

/// Evaluates the predicate and transform; `None` means the step is skipped.
pub(crate) async fn resolve_step_input(
    step: &WorkflowStep,
    wctx: &WorkflowContext,
    input: String,
) -> Option<String> {
    if let Some(predicate) = &step.predicate {
        let snapshot = wctx.snapshot().await;
        if !predicate(&snapshot) {
            return None;
        }
    }
    Some(match &step.transform {
        Some(transform) => transform(input),
        None => input,
    })
}

/// Runs one step: predicate, transform, agent run, step result.
pub(crate) async fn execute_step(
    step: &WorkflowStep,
    run_ctx: &RunContext,
    wctx: &WorkflowContext,
    input: String,
) -> StepOutcome {
    let Some(input) = resolve_step_input(step, wctx, input).await else {
        return StepOutcome::Skipped(StepResult::skipped(&step.name));
    };
    let started = Instant::now();
    match step.agent.run(run_ctx, &input).await {
        Ok(run) => StepOutcome::Completed(StepResult::from_run(&step.name, &run, started.elapsed())),
        Err(e) => StepOutcome::Failed(
            StepResult::failed(&step.name, e.to_string(), started.elapsed()),
            e,
        ),
    }
}

enum PassOutcome {
    Completed(String),
    Failed {
        last_output: String,
        error: AgentError,
    },
}

/// A scheduler over agent steps. Steps are added before the first run; a
/// workflow may be run repeatedly, each run with its own context.
pub struct Workflow {
    config: WorkflowConfig,
    steps: Vec<WorkflowStep>,
    memory: RwLock<Option<Arc<dyn Memory>>>,
    run_seq: AtomicU64,
}

impl Workflow {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
            memory: RwLock::new(None),
            run_seq: AtomicU64::new(0),
        }
    }

    /// Adds a step; names must be unique within the workflow.
    pub fn add_step(&mut self, step: WorkflowStep) -> Result<(), AgentError> {
        if self.steps.iter().any(|s| s.name == step.name) {
            return Err(AgentError::ConfigInvalid(format!(
                "duplicate step name: {}",
                step.name
            )));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Attaches shared memory, exposed to steps through the run context.
    pub fn set_memory(&self, memory: Arc<dyn Memory>) {
        *self.memory.write().expect("workflow memory lock") = Some(memory);
    }

    pub fn memory(&self) -> Option<Arc<dyn Memory>> {
        self.memory.read().expect("workflow memory lock").clone()
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub async fn initialize(&self) -> Result<(), AgentError> {
        for step in &self.steps {
            step.agent.initialize().await?;
        }
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), AgentError> {
        for step in &self.steps {
            step.agent.cleanup().await?;
        }
        Ok(())
    }

    pub(crate) fn next_run_id(&self) -> String {
        let seq = self.run_seq.fetch_add(1, Ordering::SeqCst);
        format!(
            "wf-{}-{}-{}",
            self.config.name,
            Utc::now().timestamp_millis(),
            seq
        )
    }

    /// Runs the workflow once. Step failures produce
    /// `WorkflowResult { success: false, .. }` with every step result
    /// collected so far; cancellation, timeouts, deadlocks, configuration
    /// problems, and fatal step errors (recursion limits) surface as errors.
    pub async fn run(&self, ctx: &RunContext, input: &str) -> Result<WorkflowResult, AgentError> {
        if self.steps.is_empty() {
            return Err(AgentError::ConfigInvalid("workflow has no steps".into()));
        }
        let run_id = self.next_run_id();
        let started = Instant::now();
        let cancel = ctx.cancel.child_token();
        let mut run_ctx = ctx.clone();
        run_ctx.cancel = cancel.clone();

        let wctx = Arc::new(WorkflowContext::new(run_id.clone(), self.memory()));
        run_ctx.workflow = Some(Arc::clone(&wctx));
        wctx.set_variable("initial_input", Value::String(input.to_string()))
            .await;
        wctx.set_variable("start_time", Value::String(Utc::now().to_rfc3339()))
            .await;

        debug!(workflow = %self.config.name, mode = self.config.mode.as_str(), %run_id, "workflow run starting");
        let dispatched = self.dispatch(&run_ctx, &wctx, input);
        let outcome = match self.config.timeout {
            Some(limit) => tokio::select! {
                _ = tokio::time::sleep(limit) => {
                    cancel.cancel();
                    return Err(AgentError::Timeout(limit));
                }
                outcome = dispatched => outcome,
            },
            None => dispatched.await,
        };
        cancel.cancel();

        let mut result = outcome?;
        result.duration = started.elapsed();
        result
            .metadata
            .insert("workflow_id".to_string(), Value::String(run_id));
        result.metadata.insert(
            "workflow_name".to_string(),
            Value::String(self.config.name.clone()),
        );
        result.metadata.insert(
            "mode".to_string(),
            Value::String(self.config.mode.as_str().to_string()),
        );
        Ok(result)
    }

    async fn dispatch(
        &self,
        run_ctx: &RunContext,
        wctx: &Arc<WorkflowContext>,
        input: &str,
    ) -> Result<WorkflowResult, AgentError> {
        match self.config.mode {
            WorkflowMode::Sequential => self.run_sequential(run_ctx, wctx, input).await,
            WorkflowMode::Parallel => self.run_parallel(run_ctx, wctx, input).await,
            WorkflowMode::Dag => self.run_dag(run_ctx, wctx, input).await,
            WorkflowMode::Loop => self.run_loop(run_ctx, wctx, input).await,
        }
    }

    /// One ordered pass over the step list, chaining outputs. Shared by
    /// sequential and loop modes.
    async fn run_pass(
        &self,
        run_ctx: &RunContext,
        wctx: &WorkflowContext,
        mut current: String,
        results: &mut Vec<StepResult>,
        path: &mut Vec<String>,
        tokens: &mut u32,
    ) -> Result<PassOutcome, AgentError> {
        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            if run_ctx.cancel.is_cancelled() {
                return Err(AgentError::Cancelled(format!(
                    "workflow cancelled at step {}/{}",
                    index + 1,
                    total
                )));
            }
            wctx.set_current_step(&step.name).await;
            match execute_step(step, run_ctx, wctx, current.clone()).await {
                StepOutcome::Skipped(step_result) => {
                    debug!(step = %step.name, "step skipped by predicate");
                    wctx.insert_step_result(step_result.clone()).await;
                    results.push(step_result);
                }
                StepOutcome::Completed(step_result) => {
                    *tokens += step_result.tokens;
                    current = step_result.output.clone();
                    path.push(step.name.clone());
                    wctx.insert_step_result(step_result.clone()).await;
                    results.push(step_result);
                }
                StepOutcome::Failed(step_result, e) => {
                    path.push(step.name.clone());
                    wctx.insert_step_result(step_result.clone()).await;
                    results.push(step_result);
                    // Fatal errors (recursion limit, deadlock, bad config)
                    // bubble out unwrapped so nesting preserves their kind.
                    if e.is_fatal() {
                        return Err(e);
                    }
                    let error = AgentError::StepFailed {
                        name: step.name.clone(),
                        index,
                        source: Box::new(e),
                    };
                    return Ok(PassOutcome::Failed {
                        last_output: current,
                        error,
                    });
                }
            }
        }
        Ok(PassOutcome::Completed(current))
    }

    async fn run_sequential(
        &self,
        run_ctx: &RunContext,
        wctx: &Arc<WorkflowContext>,
        input: &str,
    ) -> Result<WorkflowResult, AgentError> {
        let mut results = Vec::new();
        let mut path = Vec::new();
        let mut tokens = 0u32;
        match self
            .run_pass(run_ctx, wctx, input.to_string(), &mut results, &mut path, &mut tokens)
            .await?
        {
            PassOutcome::Completed(output) => {
                Ok(WorkflowResult::succeeded(output, results, path, tokens))
            }
            PassOutcome::Failed { last_output, error } => Ok(WorkflowResult::failed(
                last_output,
                results,
                path,
                tokens,
                error.to_string(),
            )),
        }
    }

    /// All steps start concurrently on the same input; the aggregate output
    /// joins successful, non-skipped outputs in definition order. The first
    /// failing step (by definition order) provides the reported error.
    async fn run_parallel(
        &self,
        run_ctx: &RunContext,
        wctx: &Arc<WorkflowContext>,
        input: &str,
    ) -> Result<WorkflowResult, AgentError> {
        if run_ctx.cancel.is_cancelled() {
            return Err(AgentError::Cancelled("workflow cancelled before start".into()));
        }
        let mut handles = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let step = step.clone();
            let run_ctx = run_ctx.clone();
            let wctx = Arc::clone(wctx);
            let input = input.to_string();
            handles.push(tokio::spawn(async move {
                execute_step(&step, &run_ctx, &wctx, input).await
            }));
        }
        let joined = futures::future::join_all(handles).await;

        let mut results = Vec::new();
        let mut path = Vec::new();
        let mut outputs = Vec::new();
        let mut tokens = 0u32;
        let mut first_error: Option<AgentError> = None;
        for (index, joined_outcome) in joined.into_iter().enumerate() {
            let outcome = joined_outcome
                .map_err(|e| AgentError::Handler(format!("step task failed: {e}")))?;
            match outcome {
                StepOutcome::Skipped(step_result) => results.push(step_result),
                StepOutcome::Completed(step_result) => {
                    tokens += step_result.tokens;
                    path.push(step_result.name.clone());
                    if step_result.success {
                        outputs.push(step_result.output.clone());
                    }
                    results.push(step_result);
                }
                StepOutcome::Failed(step_result, e) => {
                    path.push(step_result.name.clone());
                    if e.is_fatal() {
                        return Err(e);
                    }
                    if first_error.is_none() {
                        first_error = Some(AgentError::StepFailed {
                            name: step_result.name.clone(),
                            index,
                            source: Box::new(e),
                        });
                    }
                    results.push(step_result);
                }
            }
        }
        // Aggregation happens only after every task has finished.
        for step_result in &results {
            wctx.insert_step_result(step_result.clone()).await;
        }
        let final_output = outputs.join("\n");
        Ok(match first_error {
            Some(error) => {
                WorkflowResult::failed(final_output, results, path, tokens, error.to_string())
            }
            None => WorkflowResult::succeeded(final_output, results, path, tokens),
        })
    }

    /// Wave scheduling: each pass executes every step whose dependencies have
    /// completed. No progress with steps remaining means circular or missing
    /// dependencies.
    async fn run_dag(
        &self,
        run_ctx: &RunContext,
        wctx: &Arc<WorkflowContext>,
        input: &str,
    ) -> Result<WorkflowResult, AgentError> {
        let names: HashSet<&str> = self.steps.iter().map(|s| s.name.as_str()).collect();
        for step in &self.steps {
            for dep in &step.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(AgentError::Deadlock(format!(
                        "step {} depends on unknown step {}",
                        step.name, dep
                    )));
                }
            }
        }

        let total = self.steps.len();
        let mut done: HashMap<String, StepResult> = HashMap::new();
        let mut results = Vec::new();
        let mut path = Vec::new();
        let mut tokens = 0u32;

        loop {
            if run_ctx.cancel.is_cancelled() {
                return Err(AgentError::Cancelled(
                    "workflow cancelled between scheduling passes".into(),
                ));
            }
            let ready: Vec<&WorkflowStep> = self
                .steps
                .iter()
                .filter(|s| {
                    !done.contains_key(&s.name)
                        && s.depends_on.iter().all(|d| done.contains_key(d))
                })
                .collect();
            if ready.is_empty() {
                if done.len() == total {
                    break;
                }
                let unfinished: Vec<&str> = self
                    .steps
                    .iter()
                    .filter(|s| !done.contains_key(&s.name))
                    .map(|s| s.name.as_str())
                    .collect();
                return Err(AgentError::Deadlock(format!(
                    "circular or missing dependencies among: {}",
                    unfinished.join(", ")
                )));
            }
            for (index, step) in ready.into_iter().enumerate() {
                wctx.set_current_step(&step.name).await;
                let step_input = dag_input(step, &done, input);
                match execute_step(step, run_ctx, wctx, step_input).await {
                    StepOutcome::Skipped(step_result) => {
                        done.insert(step.name.clone(), step_result.clone());
                        wctx.insert_step_result(step_result.clone()).await;
                        results.push(step_result);
                    }
                    StepOutcome::Completed(step_result) => {
                        tokens += step_result.tokens;
                        path.push(step.name.clone());
                        done.insert(step.name.clone(), step_result.clone());
                        wctx.insert_step_result(step_result.clone()).await;
                        results.push(step_result);
                    }
                    StepOutcome::Failed(step_result, e) => {
                        path.push(step.name.clone());
                        wctx.insert_step_result(step_result.clone()).await;
                        results.push(step_result);
                        if e.is_fatal() {
                            return Err(e);
                        }
                        let error = AgentError::StepFailed {
                            name: step.name.clone(),
                            index,
                            source: Box::new(e),
                        };
                        return Ok(WorkflowResult::failed(
                            String::new(),
                            results,
                            path,
                            tokens,
                            error.to_string(),
                        ));
                    }
                }
            }
        }

        // Sinks (steps nothing depends on) provide the final output.
        let depended_on: HashSet<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.depends_on.iter().map(String::as_str))
            .collect();
        let final_output = self
            .steps
            .iter()
            .filter(|s| !depended_on.contains(s.name.as_str()))
            .filter_map(|s| done.get(&s.name))
            .filter(|sr| sr.success && !sr.skipped && !sr.output.is_empty())
            .map(|sr| sr.output.clone())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(WorkflowResult::succeeded(final_output, results, path, tokens))
    }

    /// Repeats the step list until convergence, `loop_continue = false`, or
    /// the iteration cap. Under `WorkflowConfig::strict`, hitting the cap is
    /// a `workflow_max_iterations` error rather than a normal completion.
    async fn run_loop(
        &self,
        run_ctx: &RunContext,
        wctx: &Arc<WorkflowContext>,
        input: &str,
    ) -> Result<WorkflowResult, AgentError> {
        let max = self.config.max_iterations.max(1);
        let mut current = input.to_string();
        let mut results = Vec::new();
        let mut path = Vec::new();
        let mut tokens = 0u32;
        let mut iterations = 0usize;
        let mut terminated = "max_iterations";

        for iteration in 0..max {
            wctx.set_iteration(iteration).await;
            let prior = current.clone();
            match self
                .run_pass(run_ctx, wctx, current.clone(), &mut results, &mut path, &mut tokens)
                .await?
            {
                PassOutcome::Completed(output) => current = output,
                PassOutcome::Failed { last_output, error } => {
                    return Ok(WorkflowResult::failed(
                        last_output,
                        results,
                        path,
                        tokens,
                        error.to_string(),
                    ));
                }
            }
            iterations = iteration + 1;
            if wctx.variable("loop_continue").await == Some(Value::Bool(false)) {
                terminated = "loop_continue";
                break;
            }
            if current == prior {
                terminated = "converged";
                break;
            }
        }

        if terminated == "max_iterations" && self.config.strict {
            return Err(AgentError::MaxIterations(max));
        }

        debug!(iterations, terminated, "loop workflow finished");
        let mut result = WorkflowResult::succeeded(current, results, path, tokens);
        result
            .metadata
            .insert("iterations".to_string(), Value::from(iterations as u64));
        result
            .metadata
            .insert("terminated".to_string(), Value::String(terminated.to_string()));
        Ok(result)
    }
}

/// Effective input for a DAG step: the joined outputs of its dependencies,
/// or the workflow input when it has none (or they produced nothing).
fn dag_input(step: &WorkflowStep, done: &HashMap<String, StepResult>, input: &str) -> String {
    if step.depends_on.is_empty() {
        return input.to_string();
    }
    let outputs: Vec<String> = step
        .depends_on
        .iter()
        .filter_map(|d| done.get(d))
        .filter(|sr| sr.success && !sr.skipped && !sr.output.is_empty())
        .map(|sr| sr.output.clone())
        .collect();
    if outputs.is_empty() {
        input.to_string()
    } else {
        outputs.join("\n")
    }
}
