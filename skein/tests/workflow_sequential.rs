//! Sequential workflows: chaining, skipping, transforms, failure, timeout.

mod common;

use std::time::Duration;

use common::{EchoAgent, FailAgent, SlowAgent};
use serde_json::Value;
use skein::{RunContext, Workflow, WorkflowConfig, WorkflowMode, WorkflowStep};

fn sequential(name: &str) -> Workflow {
    Workflow::new(WorkflowConfig::new(name, WorkflowMode::Sequential))
}

/// **Scenario**: steps `[A, B, C]` each appending `|name`; input `"x"`
/// yields `"x|A|B|C"` with the full execution path and three successful
/// step results.
#[tokio::test]
async fn chain_of_three_echo_steps() {
    let mut workflow = sequential("chain");
    for name in ["A", "B", "C"] {
        workflow
            .add_step(WorkflowStep::new(name, EchoAgent::new(name)))
            .unwrap();
    }

    let result = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.final_output, "x|A|B|C");
    assert_eq!(result.execution_path, vec!["A", "B", "C"]);
    assert_eq!(result.step_results.len(), 3);
    assert!(result.step_results.iter().all(|s| s.success && !s.skipped));
    assert_eq!(
        result.metadata.get("mode").and_then(Value::as_str),
        Some("sequential")
    );
}

/// **Scenario**: a false predicate skips the step without advancing the
/// carried output, and keeps it out of the execution path.
#[tokio::test]
async fn predicate_skips_without_advancing_output() {
    let mut workflow = sequential("skippy");
    workflow
        .add_step(WorkflowStep::new("A", EchoAgent::new("A")))
        .unwrap();
    workflow
        .add_step(WorkflowStep::new("B", EchoAgent::new("B")).with_predicate(|_| false))
        .unwrap();
    workflow
        .add_step(WorkflowStep::new("C", EchoAgent::new("C")))
        .unwrap();

    let result = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.final_output, "x|A|C");
    assert_eq!(result.execution_path, vec!["A", "C"]);
    let skipped = &result.step_results[1];
    assert!(skipped.skipped);
    assert!(skipped.output.is_empty());
}

/// **Scenario**: predicates can read earlier step results from the context.
#[tokio::test]
async fn predicate_reads_prior_step_results() {
    let mut workflow = sequential("conditional");
    workflow
        .add_step(WorkflowStep::new("A", EchoAgent::new("A")))
        .unwrap();
    workflow
        .add_step(
            WorkflowStep::new("B", EchoAgent::new("B")).with_predicate(|snapshot| {
                snapshot
                    .step_result("A")
                    .map(|a| a.output.contains("trigger"))
                    .unwrap_or(false)
            }),
        )
        .unwrap();

    let quiet = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert_eq!(quiet.execution_path, vec!["A"]);

    let triggered = workflow.run(&RunContext::new(), "trigger").await.unwrap();
    assert_eq!(triggered.execution_path, vec!["A", "B"]);
    assert_eq!(triggered.final_output, "trigger|A|B");
}

/// **Scenario**: the input transform rewrites the step's effective input.
#[tokio::test]
async fn transform_rewrites_step_input() {
    let mut workflow = sequential("transformed");
    workflow
        .add_step(
            WorkflowStep::new("A", EchoAgent::new("A"))
                .with_transform(|input| input.to_uppercase()),
        )
        .unwrap();
    let result = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert_eq!(result.final_output, "X|A");
}

/// **Scenario**: a failing step stops the workflow, returning a failed
/// result that keeps every step result collected so far.
#[tokio::test]
async fn failure_stops_the_chain() {
    let mut workflow = sequential("failing");
    workflow
        .add_step(WorkflowStep::new("A", EchoAgent::new("A")))
        .unwrap();
    workflow
        .add_step(WorkflowStep::new("B", FailAgent::new("B", "boom")))
        .unwrap();
    let c = EchoAgent::new("C");
    workflow
        .add_step(WorkflowStep::new("C", c.clone()))
        .unwrap();

    let result = workflow.run(&RunContext::new(), "x").await.unwrap();
    assert!(!result.success);
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("step B failed"), "{error}");
    assert!(error.contains("boom"), "{error}");
    assert_eq!(result.step_results.len(), 2);
    assert!(result.step_results[0].success);
    assert!(!result.step_results[1].success);
    assert_eq!(c.calls(), 0, "steps after the failure never run");
    assert_eq!(result.final_output, "x|A", "last good output is kept");
}

/// **Scenario**: duplicate step names are rejected at add time.
#[tokio::test]
async fn duplicate_step_names_rejected() {
    let mut workflow = sequential("dups");
    workflow
        .add_step(WorkflowStep::new("A", EchoAgent::new("A")))
        .unwrap();
    let err = workflow
        .add_step(WorkflowStep::new("A", EchoAgent::new("A2")))
        .unwrap_err();
    assert_eq!(err.kind().as_str(), "config_invalid");
}

/// **Scenario**: a workflow with no steps refuses to run.
#[tokio::test]
async fn empty_workflow_refuses_to_run() {
    let workflow = sequential("empty");
    let err = workflow.run(&RunContext::new(), "x").await.unwrap_err();
    assert_eq!(err.kind().as_str(), "config_invalid");
}

/// **Scenario**: the workflow timeout cancels a stuck step and surfaces as
/// a timeout-kind error.
#[tokio::test]
async fn workflow_timeout_cancels_steps() {
    let mut workflow = Workflow::new(
        WorkflowConfig::new("slow", WorkflowMode::Sequential)
            .with_timeout(Duration::from_millis(40)),
    );
    workflow
        .add_step(WorkflowStep::new("S", SlowAgent::new("S")))
        .unwrap();
    let err = workflow.run(&RunContext::new(), "x").await.unwrap_err();
    assert_eq!(err.kind().as_str(), "timeout");
}

/// **Scenario**: cancelling the caller's context stops scheduling with a
/// cancellation-kind error.
#[tokio::test]
async fn caller_cancellation_stops_scheduling() {
    let mut workflow = sequential("cancellable");
    workflow
        .add_step(WorkflowStep::new("S", SlowAgent::new("S")))
        .unwrap();
    workflow
        .add_step(WorkflowStep::new("T", EchoAgent::new("T")))
        .unwrap();

    let ctx = RunContext::new();
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });
    let outcome = workflow.run(&ctx, "x").await;
    match outcome {
        Err(e) => assert_eq!(e.kind().as_str(), "cancelled"),
        Ok(result) => {
            // The slow step observed the cancellation itself; either way no
            // later step ran and the run did not succeed.
            assert!(!result.success);
        }
    }
}

/// **Scenario**: sequential streaming forwards step-tagged chunks and ends
/// with the combined text, then done.
#[tokio::test]
async fn sequential_streaming_tags_chunks() {
    use skein::{ChunkData, StreamOptions};

    let mut workflow = sequential("streamy");
    workflow
        .add_step(WorkflowStep::new("A", EchoAgent::new("A")))
        .unwrap();
    workflow
        .add_step(WorkflowStep::new("B", EchoAgent::new("B")))
        .unwrap();

    let mut stream = workflow
        .run_stream(&RunContext::new(), "x", StreamOptions::default())
        .await
        .unwrap();

    let mut saw_announce = false;
    let mut step_texts = Vec::new();
    let mut final_text = None;
    let mut done = false;
    let mut last_index = None;
    while let Some(chunk) = stream.recv().await {
        if let Some(prev) = last_index {
            assert!(chunk.index > prev, "indices strictly increase");
        }
        last_index = Some(chunk.index);
        match &chunk.data {
            ChunkData::Metadata { data } => {
                if data.get("workflow").is_some() {
                    saw_announce = true;
                }
            }
            ChunkData::Text { content } => {
                match chunk.metadata.get("step_name") {
                    Some(step) => step_texts.push((step.clone(), content.clone())),
                    None => final_text = Some(content.clone()),
                }
            }
            ChunkData::Done => done = true,
            _ => {}
        }
    }
    assert!(saw_announce);
    assert_eq!(
        step_texts,
        vec![
            ("A".to_string(), "x|A".to_string()),
            ("B".to_string(), "x|A|B".to_string())
        ]
    );
    assert_eq!(final_text.as_deref(), Some("x|A|B"));
    assert!(done);

    let result = stream.wait().await.unwrap();
    assert_eq!(result.content, "x|A|B");
    assert_eq!(result.metadata.get("streamed"), Some(&Value::Bool(true)));
}
