//! Example: streaming a sequential workflow of two agents.
//!
//! Each step's chunks arrive tagged with the step name; the final text chunk
//! carries the combined output.
//!
//! Run: `cargo run -p skein-examples --example workflow_stream -- "draft"`

use std::env;
use std::sync::Arc;

use skein::{
    ChunkData, LlmAgent, LlmConfig, MockLlm, RunContext, StreamOptions, Workflow,
    WorkflowConfig, WorkflowMode, WorkflowStep,
};

fn agent(name: &str, reply: &str) -> Arc<LlmAgent> {
    let mut builder = LlmAgent::builder(name);
    builder
        .llm_config(LlmConfig::new("mock", "mock-model"))
        .expect("builder is open");
    builder
        .llm(Arc::new(MockLlm::with_reply(reply)))
        .expect("builder is open");
    Arc::new(builder.build().expect("valid agent config"))
}

#[tokio::main]
async fn main() {
    let input = env::args().nth(1).unwrap_or_else(|| "draft".to_string());

    let writer = agent("writer", "a first draft of the answer");
    let editor = agent("editor", "the polished answer");

    let mut workflow = Workflow::new(WorkflowConfig::new(
        "write-then-edit",
        WorkflowMode::Sequential,
    ));
    workflow
        .add_step(WorkflowStep::new("write", writer.clone()))
        .expect("unique step name");
    workflow
        .add_step(WorkflowStep::new("edit", editor.clone()))
        .expect("unique step name");
    workflow.initialize().await.expect("agents initialize");

    let ctx = RunContext::new();
    let mut stream = workflow
        .run_stream(&ctx, &input, StreamOptions::default())
        .await
        .expect("stream opens");

    while let Some(chunk) = stream.recv().await {
        let step = chunk
            .metadata
            .get("step_name")
            .map(String::as_str)
            .unwrap_or("-");
        match &chunk.data {
            ChunkData::Delta { content } => println!("[{step}] delta: {content}"),
            ChunkData::Text { content } => println!("[{step}] text: {content}"),
            ChunkData::Metadata { data } => println!("[{step}] meta: {data}"),
            ChunkData::Done => println!("[{step}] done"),
            other => println!("[{step}] {:?}", other.kind()),
        }
    }

    let result = stream.wait().await.expect("workflow stream completes");
    println!("final output: {}", result.content);
}
