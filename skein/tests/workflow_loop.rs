//! Loop workflows: convergence, the `loop_continue` variable, and the
//! iteration cap.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{EchoAgent, FixedAgent};
use serde_json::Value;
use skein::{
    Agent, AgentConfig, AgentError, LlmConfig, RunContext, RunOptions, RunResult, Workflow,
    WorkflowConfig, WorkflowMode, WorkflowStep,
};

fn looping(name: &str, max_iterations: usize) -> Workflow {
    Workflow::new(
        WorkflowConfig::new(name, WorkflowMode::Loop).with_max_iterations(max_iterations),
    )
}

/// **Scenario**: a fixed-output step converges on the second iteration
/// (output equals the prior iteration's input).
#[tokio::test]
async fn converges_when_output_stabilizes() {
    let mut workflow = looping("stabilize", 10);
    workflow
        .add_step(WorkflowStep::new("fix", FixedAgent::new("fix", "stable")))
        .unwrap();
    let result = workflow.run(&RunContext::new(), "seed").await.unwrap();
    assert!(result.success);
    assert_eq!(result.final_output, "stable");
    assert_eq!(
        result.metadata.get("terminated").and_then(Value::as_str),
        Some("converged")
    );
    assert_eq!(result.metadata.get("iterations"), Some(&Value::from(2u64)));
}

/// **Scenario**: an ever-growing output hits the iteration cap.
#[tokio::test]
async fn iteration_cap_bounds_the_loop() {
    let agent = EchoAgent::new("grow");
    let mut workflow = looping("capped", 3);
    workflow
        .add_step(WorkflowStep::new("grow", agent.clone()))
        .unwrap();
    let result = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.final_output, "x|grow|grow|grow");
    assert_eq!(agent.calls(), 3);
    assert_eq!(
        result.metadata.get("terminated").and_then(Value::as_str),
        Some("max_iterations")
    );
}

/// **Scenario**: under `strict`, hitting the cap surfaces as a
/// `workflow_max_iterations` error; convergence still completes normally.
#[tokio::test]
async fn strict_mode_surfaces_cap_as_error() {
    let mut workflow = Workflow::new(
        WorkflowConfig::new("strict-capped", WorkflowMode::Loop)
            .with_max_iterations(3)
            .with_strict(true),
    );
    workflow
        .add_step(WorkflowStep::new("grow", EchoAgent::new("grow")))
        .unwrap();
    let err = workflow.run(&RunContext::new(), "x").await.unwrap_err();
    assert_eq!(err.kind().as_str(), "workflow_max_iterations");

    let mut converging = Workflow::new(
        WorkflowConfig::new("strict-stable", WorkflowMode::Loop)
            .with_max_iterations(10)
            .with_strict(true),
    );
    converging
        .add_step(WorkflowStep::new("fix", FixedAgent::new("fix", "stable")))
        .unwrap();
    let result = converging.run(&RunContext::new(), "seed").await.unwrap();
    assert!(result.success, "convergence is not a cap violation");
}

/// **Scenario**: the streaming variant of a strict capped loop emits an
/// error chunk and closes with the same kind instead of `done`.
#[tokio::test]
async fn strict_streaming_loop_closes_with_error() {
    use skein::{ChunkData, StreamOptions};

    let mut workflow = Workflow::new(
        WorkflowConfig::new("strict-stream", WorkflowMode::Loop)
            .with_max_iterations(2)
            .with_strict(true),
    );
    workflow
        .add_step(WorkflowStep::new("grow", EchoAgent::new("grow")))
        .unwrap();
    let mut stream = workflow
        .run_stream(&RunContext::new(), "x", StreamOptions::default())
        .await
        .unwrap();
    let mut error_kind = None;
    let mut saw_done = false;
    while let Some(chunk) = stream.recv().await {
        match &chunk.data {
            ChunkData::Error { error } => error_kind = Some(error.kind.clone()),
            ChunkData::Done => saw_done = true,
            _ => {}
        }
    }
    assert_eq!(error_kind.as_deref(), Some("workflow_max_iterations"));
    assert!(!saw_done);
    let err = stream.wait().await.unwrap_err();
    assert_eq!(err.kind().as_str(), "workflow_max_iterations");
}

/// Stops the loop by setting `loop_continue = false` on its second run.
struct BrakeAgent {
    config: AgentConfig,
    calls: AtomicUsize,
}

impl BrakeAgent {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            config: AgentConfig::new("brake", LlmConfig::new("stub", "stub-model")),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Agent for BrakeAgent {
    fn name(&self) -> &str {
        "brake"
    }
    fn config(&self) -> &AgentConfig {
        &self.config
    }
    async fn run_with_options(
        &self,
        ctx: &RunContext,
        input: &str,
        _options: RunOptions,
    ) -> Result<RunResult, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= 1 {
            if let Some(workflow) = &ctx.workflow {
                workflow
                    .set_variable("loop_continue", Value::Bool(false))
                    .await;
            }
        }
        Ok(RunResult::new(format!("{input}+")))
    }
}

/// **Scenario**: `loop_continue = false` in the workflow context ends the
/// loop after the current iteration.
#[tokio::test]
async fn loop_continue_false_stops_the_loop() {
    let agent = BrakeAgent::new();
    let mut workflow = looping("braked", 10);
    workflow
        .add_step(WorkflowStep::new("brake", agent.clone()))
        .unwrap();
    let result = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert!(result.success);
    assert_eq!(agent.calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.final_output, "x++");
    assert_eq!(
        result.metadata.get("terminated").and_then(Value::as_str),
        Some("loop_continue")
    );
}

/// **Scenario**: iteration numbers are visible to predicates through the
/// context snapshot.
#[tokio::test]
async fn iteration_number_visible_to_predicates() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen_by_predicate = Arc::clone(&seen);

    let mut workflow = looping("observed", 3);
    workflow
        .add_step(
            WorkflowStep::new("grow", EchoAgent::new("grow")).with_predicate(move |snapshot| {
                seen_by_predicate
                    .lock()
                    .expect("seen lock")
                    .push(snapshot.iteration);
                true
            }),
        )
        .unwrap();
    workflow.run(&RunContext::new(), "x").await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
}

/// **Scenario**: a step failure inside an iteration propagates immediately.
#[tokio::test]
async fn step_failure_propagates_from_loop() {
    let mut workflow = looping("failing", 5);
    workflow
        .add_step(WorkflowStep::new(
            "bad",
            common::FailAgent::new("bad", "kaput"),
        ))
        .unwrap();
    let result = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("step bad failed"));
    assert_eq!(result.step_results.len(), 1);
}

/// **Scenario**: loop streaming repeats passes and still closes with one
/// final text and one done chunk.
#[tokio::test]
async fn loop_streaming_ends_with_single_done() {
    use skein::{ChunkData, StreamOptions};

    let mut workflow = looping("streamed", 2);
    workflow
        .add_step(WorkflowStep::new("grow", EchoAgent::new("grow")))
        .unwrap();
    let mut stream = workflow
        .run_stream(&RunContext::new(), "x", StreamOptions::default())
        .await
        .unwrap();
    let mut dones = 0;
    let mut last_text = None;
    while let Some(chunk) = stream.recv().await {
        match &chunk.data {
            ChunkData::Done => dones += 1,
            ChunkData::Text { content } if chunk.metadata.get("step_name").is_none() => {
                last_text = Some(content.clone())
            }
            _ => {}
        }
    }
    assert_eq!(dones, 1);
    assert_eq!(last_text.as_deref(), Some("x|grow|grow"));
    assert!(stream.wait().await.is_ok());
}
