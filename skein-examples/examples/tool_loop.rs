//! Example: the agentic tool loop with a calculator tool.
//!
//! The mock LLM first replies with a function-style tool call, then with a
//! final answer once it has seen the tool result.
//!
//! Run: `cargo run -p skein-examples --example tool_loop`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use skein::{
    Agent, AgentError, LlmAgent, LlmConfig, MockLlm, RunContext, Tool, ToolOutput,
};

struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Adds two integers a and b"
    }

    async fn execute(&self, args: &HashMap<String, Value>) -> Result<ToolOutput, AgentError> {
        let num = |key: &str| {
            args.get(key)
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<i64>().ok())
        };
        match (num("a"), num("b")) {
            (Some(a), Some(b)) => Ok(ToolOutput::ok((a + b).to_string())),
            _ => Ok(ToolOutput::err("a and b must be integers")),
        }
    }
}

#[tokio::main]
async fn main() {
    let llm = Arc::new(MockLlm::with_script(vec![
        "add(a=3, b=4)".to_string(),
        "3 + 4 = 7".to_string(),
    ]));

    let mut builder = LlmAgent::builder("calc");
    builder
        .llm_config(LlmConfig::new("mock", "mock-model"))
        .expect("builder is open");
    builder.llm(llm.clone()).expect("builder is open");
    builder.tool(Arc::new(AddTool)).expect("builder is open");
    let agent = builder.build().expect("valid agent config");
    agent.initialize().await.expect("mock agent initializes");

    let result = agent
        .run(&RunContext::new(), "what is 3+4?")
        .await
        .expect("run succeeds");

    println!("final: {}", result.content);
    for call in &result.tool_calls {
        println!(
            "tool {}({:?}) -> {:?} in {:?}",
            call.name, call.arguments, call.result, call.duration
        );
    }
    println!("llm calls: {}", llm.calls());
}
