//! Sub-workflow composition: result conversion, chunk tagging, and the
//! recursion bound.

mod common;

use std::sync::Arc;

use common::{EchoAgent, FixedAgent};
use serde_json::Value;
use skein::{
    Agent, RunContext, StreamOptions, SubWorkflowAgent, Workflow, WorkflowConfig, WorkflowMode,
    WorkflowStep,
};

fn sequential(name: &str) -> Workflow {
    Workflow::new(WorkflowConfig::new(name, WorkflowMode::Sequential))
}

/// **Scenario**: a workflow wrapped as an agent converts its result into an
/// agent result with the sub-workflow metadata keys.
#[tokio::test]
async fn workflow_result_converts_to_agent_result() {
    let mut inner = sequential("inner");
    inner
        .add_step(WorkflowStep::new("A", EchoAgent::new("A")))
        .unwrap();
    inner
        .add_step(WorkflowStep::new("B", EchoAgent::new("B")))
        .unwrap();

    let wrapper = SubWorkflowAgent::new("nested", Arc::new(inner))
        .with_description("a nested pipeline");

    let result = wrapper.run(&RunContext::new(), "x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.content, "x|A|B");
    assert_eq!(result.metadata["type"], Value::String("subworkflow".into()));
    assert_eq!(result.metadata["workflow_name"], "inner");
    assert_eq!(result.metadata["workflow_path"], "nested");
    assert_eq!(result.metadata["depth"], 0);
    assert_eq!(result.metadata["step_count"], 2);
    assert_eq!(result.metadata["execution_path"], serde_json::json!(["A", "B"]));
    assert_eq!(result.metadata["execution_count"], 1);

    let caps = wrapper.capabilities();
    assert!(caps.contains(&"workflow_execution".to_string()));
    assert!(caps.contains(&"workflow_composition".to_string()));
    assert!(caps.contains(&"sequential".to_string()));
}

/// **Scenario**: execution stats accumulate across wrapper runs.
#[tokio::test]
async fn execution_count_accumulates() {
    let mut inner = sequential("inner");
    inner
        .add_step(WorkflowStep::new("A", EchoAgent::new("A")))
        .unwrap();
    let wrapper = SubWorkflowAgent::new("nested", Arc::new(inner));
    wrapper.run(&RunContext::new(), "x").await.unwrap();
    let second = wrapper.run(&RunContext::new(), "y").await.unwrap();
    assert_eq!(second.metadata["execution_count"], 2);
    assert!(second.metadata.get("avg_duration_ms").is_some());
}

/// **Scenario**: a sub-workflow can be a step of an outer workflow.
#[tokio::test]
async fn subworkflow_as_a_step() {
    let mut inner = sequential("inner");
    inner
        .add_step(WorkflowStep::new("I", EchoAgent::new("I")))
        .unwrap();
    let nested = Arc::new(SubWorkflowAgent::new("nested", Arc::new(inner)));

    let mut outer = sequential("outer");
    outer
        .add_step(WorkflowStep::new("pre", EchoAgent::new("pre")))
        .unwrap();
    outer.add_step(WorkflowStep::new("sub", nested)).unwrap();

    let result = outer.run(&RunContext::new(), "x").await.unwrap();
    assert!(result.success);
    assert_eq!(result.final_output, "x|pre|I");
    assert_eq!(result.execution_path, vec!["pre", "sub"]);
}

/// **Scenario**: sub-workflow streaming tags every chunk with the wrapper's
/// path and depth while preserving inner order.
#[tokio::test]
async fn stream_chunks_carry_subworkflow_tags() {
    let mut inner = sequential("inner");
    inner
        .add_step(WorkflowStep::new("A", FixedAgent::new("A", "A-out")))
        .unwrap();
    let wrapper = SubWorkflowAgent::new("nested", Arc::new(inner))
        .with_parent_path("outer")
        .with_depth(1)
        .with_max_depth(5);

    let mut stream = wrapper
        .run_stream(&RunContext::new(), "x", StreamOptions::default())
        .await
        .unwrap();
    let mut count = 0;
    let mut last_index = None;
    while let Some(chunk) = stream.recv().await {
        count += 1;
        if let Some(prev) = last_index {
            assert!(chunk.index > prev, "inner index order is preserved");
        }
        last_index = Some(chunk.index);
        assert_eq!(
            chunk.metadata.get("parent_subworkflow").map(String::as_str),
            Some("nested")
        );
        assert_eq!(
            chunk.metadata.get("subworkflow_path").map(String::as_str),
            Some("outer/nested")
        );
        assert_eq!(
            chunk.metadata.get("subworkflow_depth").map(String::as_str),
            Some("1")
        );
    }
    assert!(count > 0);
    assert!(stream.wait().await.is_ok());
}

/// **Scenario**: the nested context exposes path and depth to inner steps.
#[tokio::test]
async fn nested_context_carries_path_and_depth() {
    use async_trait::async_trait;
    use skein::{AgentConfig, AgentError, LlmConfig, RunOptions, RunResult};

    struct Introspect {
        config: AgentConfig,
    }

    #[async_trait]
    impl Agent for Introspect {
        fn name(&self) -> &str {
            "introspect"
        }
        fn config(&self) -> &AgentConfig {
            &self.config
        }
        async fn run_with_options(
            &self,
            ctx: &RunContext,
            _input: &str,
            _options: RunOptions,
        ) -> Result<RunResult, AgentError> {
            let path = ctx
                .value("subworkflow_path")
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string();
            let depth = ctx
                .value("subworkflow_depth")
                .and_then(Value::as_u64)
                .unwrap_or(99);
            Ok(RunResult::new(format!("{path}@{depth}")))
        }
    }

    let mut inner = sequential("inner");
    inner
        .add_step(WorkflowStep::new(
            "peek",
            Arc::new(Introspect {
                config: AgentConfig::new("introspect", LlmConfig::new("stub", "stub-model")),
            }),
        ))
        .unwrap();
    let wrapper = SubWorkflowAgent::new("nested", Arc::new(inner))
        .with_parent_path("root")
        .with_depth(2)
        .with_max_depth(5);
    let result = wrapper.run(&RunContext::new(), "x").await.unwrap();
    assert_eq!(result.content, "root/nested@2");
}

/// **Scenario**: a chain of 11 wrappers with `max_depth = 10` fails with
/// `recursion_limit` naming the depth-11 path, and the innermost agent is
/// never invoked.
#[tokio::test]
async fn recursion_limit_stops_depth_eleven_chain() {
    let leaf = EchoAgent::new("leaf");
    let mut innermost = sequential("leaf-wf");
    innermost
        .add_step(WorkflowStep::new("leaf", leaf.clone()))
        .unwrap();

    let full_path = |upto: usize| -> String {
        (0..upto)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join("/")
    };

    let mut current: Arc<dyn Agent> = Arc::new(
        SubWorkflowAgent::new("w10", Arc::new(innermost))
            .with_depth(10)
            .with_max_depth(10)
            .with_parent_path(full_path(10)),
    );
    for depth in (0..10).rev() {
        let mut wf = sequential(&format!("wf{depth}"));
        wf.add_step(WorkflowStep::new(format!("s{depth}"), current))
            .unwrap();
        current = Arc::new(
            SubWorkflowAgent::new(format!("w{depth}"), Arc::new(wf))
                .with_depth(depth)
                .with_max_depth(10)
                .with_parent_path(full_path(depth)),
        );
    }

    let err = current.run(&RunContext::new(), "go").await.unwrap_err();
    assert_eq!(err.kind().as_str(), "recursion_limit");
    let message = err.to_string();
    assert!(
        message.contains("w0/w1/w2/w3/w4/w5/w6/w7/w8/w9/w10"),
        "{message}"
    );
    assert_eq!(leaf.calls(), 0, "the trivial agent never ran");
}
