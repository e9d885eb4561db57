//! Streaming workflow execution: one outer stream over all steps.
//!
//! The producer announces the workflow, then for each step (in the order the
//! mode dictates) emits a step marker, subscribes to the step agent's inner
//! stream, and forwards every inner chunk tagged with the step name. The DAG
//! variant streams over a topological order with sequential chaining; loop
//! mode repeats passes under the usual termination rules.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use stream_chunk::{Chunk, ChunkData, ChunkError, ChunkKind, StreamMetadata};
use tracing::warn;

use crate::error::AgentError;
use crate::options::StreamOptions;
use crate::result::{RunResult, TokenUsage};
use crate::stream::{ChunkStream, ChunkWriter};
use crate::traits::RunContext;
use crate::workflow::config::{WorkflowConfig, WorkflowMode};
use crate::workflow::context::WorkflowContext;
use crate::workflow::engine::{resolve_step_input, Workflow};
use crate::workflow::result::StepResult;
use crate::workflow::step::WorkflowStep;

/// Steps in dependency order, definition order within a wave.
fn topological_order(steps: &[WorkflowStep]) -> Result<Vec<WorkflowStep>, AgentError> {
    let names: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    for step in steps {
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(AgentError::Deadlock(format!(
                    "step {} depends on unknown step {}",
                    step.name, dep
                )));
            }
        }
    }
    let mut done: HashSet<String> = HashSet::new();
    let mut order = Vec::with_capacity(steps.len());
    while order.len() < steps.len() {
        let ready: Vec<&WorkflowStep> = steps
            .iter()
            .filter(|s| !done.contains(&s.name) && s.depends_on.iter().all(|d| done.contains(d)))
            .collect();
        if ready.is_empty() {
            let unfinished: Vec<&str> = steps
                .iter()
                .filter(|s| !done.contains(&s.name))
                .map(|s| s.name.as_str())
                .collect();
            return Err(AgentError::Deadlock(format!(
                "circular or missing dependencies among: {}",
                unfinished.join(", ")
            )));
        }
        for step in ready {
            done.insert(step.name.clone());
            order.push(step.clone());
        }
    }
    Ok(order)
}

struct StreamTotals {
    results: Vec<StepResult>,
    path: Vec<String>,
    tokens: u32,
}

impl Workflow {
    /// Streaming run: returns the outer stream immediately; the producer
    /// runs in a background task. Stream failures emit an `error` chunk and
    /// close with the error instead of `done`.
    pub async fn run_stream(
        &self,
        ctx: &RunContext,
        input: &str,
        options: StreamOptions,
    ) -> Result<ChunkStream, AgentError> {
        if self.steps().is_empty() {
            return Err(AgentError::ConfigInvalid("workflow has no steps".into()));
        }
        let order = match self.config().mode {
            WorkflowMode::Dag => topological_order(self.steps())?,
            _ => self.steps().to_vec(),
        };
        let run_id = self.next_run_id();
        let wctx = Arc::new(WorkflowContext::new(run_id.clone(), self.memory()));
        wctx.set_variable("initial_input", Value::String(input.to_string()))
            .await;
        wctx.set_variable("start_time", Value::String(Utc::now().to_rfc3339()))
            .await;

        let metadata =
            StreamMetadata::new(&self.config().name).with_extra("workflow_id", run_id);
        let (stream, writer) = ChunkStream::channel(metadata, options, &ctx.cancel);
        // Steps run under the stream's scope so consumer cancellation reaches
        // in-flight agents.
        let mut run_ctx = ctx.clone();
        run_ctx.cancel = writer.cancellation();
        run_ctx.workflow = Some(Arc::clone(&wctx));

        let config = self.config().clone();
        let input = input.to_string();
        tokio::spawn(async move {
            let work = drive_stream(&config, &order, &run_ctx, &wctx, &writer, &input);
            match config.timeout {
                Some(limit) => tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        writer.close_with_error(AgentError::Timeout(limit));
                    }
                    _ = work => {}
                },
                None => work.await,
            }
        });
        Ok(stream)
    }
}

async fn drive_stream(
    config: &WorkflowConfig,
    order: &[WorkflowStep],
    run_ctx: &RunContext,
    wctx: &WorkflowContext,
    writer: &ChunkWriter,
    input: &str,
) {
    let started = Instant::now();
    let announce = ChunkData::Metadata {
        data: json!({
            "workflow": config.name,
            "mode": config.mode.as_str(),
            "total_steps": order.len(),
        }),
    };
    if write_or_warn(writer, announce).await.is_err() {
        writer.close();
        return;
    }

    let mut totals = StreamTotals {
        results: Vec::new(),
        path: Vec::new(),
        tokens: 0,
    };

    let combined = match config.mode {
        WorkflowMode::Loop => {
            let max = config.max_iterations.max(1);
            let mut current = input.to_string();
            let mut outputs = Vec::new();
            let mut finished = Ok(());
            let mut capped = true;
            for iteration in 0..max {
                wctx.set_iteration(iteration).await;
                let prior = current.clone();
                match stream_pass(writer, run_ctx, wctx, order, &current, true, &mut totals, &mut outputs)
                    .await
                {
                    Ok(output) => current = output,
                    Err(e) => {
                        capped = false;
                        finished = Err(e);
                        break;
                    }
                }
                if wctx.variable("loop_continue").await == Some(Value::Bool(false)) {
                    capped = false;
                    break;
                }
                if current == prior {
                    capped = false;
                    break;
                }
            }
            if capped && config.strict {
                let error = AgentError::MaxIterations(max);
                let chunk = ChunkData::Error {
                    error: ChunkError {
                        kind: error.kind().as_str().to_string(),
                        message: error.to_string(),
                        details: error.details(),
                    },
                };
                let _ = write_or_warn(writer, chunk).await;
                finished = Err(error);
            }
            match finished {
                Ok(()) => current,
                Err(e) => {
                    writer.close_with_error(e);
                    return;
                }
            }
        }
        WorkflowMode::Parallel => {
            let mut outputs = Vec::new();
            match stream_pass(writer, run_ctx, wctx, order, input, false, &mut totals, &mut outputs)
                .await
            {
                Ok(_) => outputs.join("\n"),
                Err(e) => {
                    writer.close_with_error(e);
                    return;
                }
            }
        }
        WorkflowMode::Sequential | WorkflowMode::Dag => {
            let mut outputs = Vec::new();
            match stream_pass(writer, run_ctx, wctx, order, input, true, &mut totals, &mut outputs)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    writer.close_with_error(e);
                    return;
                }
            }
        }
    };

    let _ = write_or_warn(
        writer,
        ChunkData::Text {
            content: combined.clone(),
        },
    )
    .await;

    let mut result = RunResult::new(combined);
    result.usage = TokenUsage {
        prompt_tokens: 0,
        completion_tokens: 0,
        total_tokens: totals.tokens,
    };
    result.duration = started.elapsed();
    result.metadata.insert("streamed".to_string(), Value::Bool(true));
    result.metadata.insert(
        "workflow_name".to_string(),
        Value::String(config.name.clone()),
    );
    result.metadata.insert(
        "mode".to_string(),
        Value::String(config.mode.as_str().to_string()),
    );
    result.metadata.insert(
        "execution_path".to_string(),
        Value::Array(totals.path.iter().cloned().map(Value::String).collect()),
    );
    result.metadata.insert(
        "step_results".to_string(),
        Value::from(totals.results.len() as u64),
    );
    writer.set_result(result);
    let _ = write_or_warn(writer, ChunkData::Done).await;
    writer.close();
}

/// One streamed pass over `steps`. `chained` threads each output into the
/// next step; otherwise every step sees the pass input. Returns the last
/// carried output; a failing step yields `Err` after the error chunk has
/// been emitted.
#[allow(clippy::too_many_arguments)]
async fn stream_pass(
    writer: &ChunkWriter,
    run_ctx: &RunContext,
    wctx: &WorkflowContext,
    steps: &[WorkflowStep],
    input: &str,
    chained: bool,
    totals: &mut StreamTotals,
    outputs: &mut Vec<String>,
) -> Result<String, AgentError> {
    let total = steps.len();
    let mut current = input.to_string();
    for (index, step) in steps.iter().enumerate() {
        if run_ctx.cancel.is_cancelled() {
            let error = AgentError::Cancelled(format!(
                "workflow cancelled at step {}/{}",
                index + 1,
                total
            ));
            let step_result = StepResult::failed(&step.name, error.to_string(), Instant::now().elapsed());
            wctx.insert_step_result(step_result.clone()).await;
            totals.results.push(step_result);
            return Err(error);
        }
        wctx.set_current_step(&step.name).await;
        let marker = ChunkData::Metadata {
            data: json!({
                "step_name": step.name,
                "step_index": index,
                "total_steps": total,
            }),
        };
        write_or_warn(writer, marker).await?;

        let pass_input = if chained { current.clone() } else { input.to_string() };
        let Some(step_input) = resolve_step_input(step, wctx, pass_input).await else {
            let step_result = StepResult::skipped(&step.name);
            wctx.insert_step_result(step_result.clone()).await;
            totals.results.push(step_result);
            continue;
        };

        let step_started = Instant::now();
        let inner = step
            .agent
            .run_stream(run_ctx, &step_input, StreamOptions::default())
            .await;
        let mut inner = match inner {
            Ok(inner) => inner,
            Err(e) => {
                return Err(fail_step(writer, wctx, totals, step, index, e, step_started).await);
            }
        };

        let mut step_output = String::new();
        let mut seen = 0u64;
        while let Some(mut chunk) = inner.recv().await {
            // Terminal markers belong to the outer stream only.
            if matches!(chunk.kind(), ChunkKind::Done | ChunkKind::Error) {
                continue;
            }
            seen += 1;
            chunk
                .metadata
                .insert("step_name".to_string(), step.name.clone());
            chunk
                .metadata
                .insert("chunk_count".to_string(), seen.to_string());
            if let Some(text) = chunk.text_payload() {
                step_output.push_str(text);
            }
            if forward_or_warn(writer, chunk).await.is_err() {
                let error = AgentError::Cancelled("outer stream cancelled".into());
                inner.cancel();
                return Err(fail_step(writer, wctx, totals, step, index, error, step_started).await);
            }
        }

        match inner.wait().await {
            Ok(run) => {
                let output = if step_output.is_empty() {
                    run.content.clone()
                } else {
                    step_output
                };
                let mut step_result = StepResult::from_run(&step.name, &run, step_started.elapsed());
                step_result.output = output.clone();
                totals.tokens += step_result.tokens;
                totals.path.push(step.name.clone());
                wctx.insert_step_result(step_result.clone()).await;
                totals.results.push(step_result);
                if run.success {
                    outputs.push(output.clone());
                }
                if chained {
                    current = output;
                }
            }
            Err(e) => {
                return Err(fail_step(writer, wctx, totals, step, index, e, step_started).await);
            }
        }
    }
    Ok(current)
}

/// Records a failed step result, emits the error chunk, and returns the
/// wrapped error for `close_with_error`.
async fn fail_step(
    writer: &ChunkWriter,
    wctx: &WorkflowContext,
    totals: &mut StreamTotals,
    step: &WorkflowStep,
    index: usize,
    error: AgentError,
    started: Instant,
) -> AgentError {
    let elapsed = started.elapsed();
    let step_result = StepResult::failed(
        &step.name,
        format!("failed after {:.1}s: {error}", elapsed.as_secs_f64()),
        elapsed,
    );
    wctx.insert_step_result(step_result.clone()).await;
    totals.path.push(step.name.clone());
    totals.results.push(step_result);

    let chunk = ChunkData::Error {
        error: ChunkError {
            kind: error.kind().as_str().to_string(),
            message: error.to_string(),
            details: error.details(),
        },
    };
    let _ = write_or_warn(writer, chunk).await;
    if error.is_fatal() {
        return error;
    }
    AgentError::StepFailed {
        name: step.name.clone(),
        index,
        source: Box::new(error),
    }
}

/// Wrapped write on the outer stream. A failed write means the stream is
/// gone, so the caller stops cleanly; a panic during the write is reported
/// as a warning and execution continues.
async fn write_or_warn(writer: &ChunkWriter, data: ChunkData) -> Result<(), AgentError> {
    match AssertUnwindSafe(writer.write(data)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!(error = %e, "workflow stream write failed");
            Err(e)
        }
        Err(payload) => {
            warn!(
                panic = %crate::error::panic_message(payload.as_ref()),
                "panic during chunk write, continuing"
            );
            Ok(())
        }
    }
}

/// Wrapped forward of an inner chunk, same failure model as [`write_or_warn`].
async fn forward_or_warn(writer: &ChunkWriter, chunk: Chunk) -> Result<(), AgentError> {
    match AssertUnwindSafe(writer.forward(chunk)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            warn!(error = %e, "workflow chunk forwarding failed");
            Err(e)
        }
        Err(payload) => {
            warn!(
                panic = %crate::error::panic_message(payload.as_ref()),
                "panic during chunk forwarding, continuing"
            );
            Ok(())
        }
    }
}
