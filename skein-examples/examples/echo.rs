//! Example: a minimal agent run against the mock LLM.
//!
//! Builds an agent with [`MockLlm`], initializes it, runs one turn, and
//! prints the result with its token usage.
//!
//! Run: `cargo run -p skein-examples --example echo -- "hello"`

use std::env;
use std::sync::Arc;

use skein::{Agent, LlmAgent, LlmConfig, MockLlm, RunContext, TokenUsage};

#[tokio::main]
async fn main() {
    let input = env::args().nth(1).unwrap_or_else(|| "hello".to_string());

    let llm = Arc::new(
        MockLlm::with_reply(format!("You said: {input}")).with_usage(TokenUsage::new(5, 2)),
    );
    let mut builder = LlmAgent::builder("echo");
    builder
        .llm_config(LlmConfig::new("mock", "mock-model"))
        .expect("builder is open");
    builder
        .system_prompt("You are a helpful assistant")
        .expect("builder is open");
    builder.llm(llm).expect("builder is open");
    let agent = builder.build().expect("valid agent config");

    agent.initialize().await.expect("mock agent initializes");

    let ctx = RunContext::new();
    match agent.run(&ctx, &input).await {
        Ok(result) => {
            println!("{}", result.content);
            println!(
                "({} tokens in {:?})",
                result.usage.total_tokens, result.duration
            );
        }
        Err(e) => eprintln!("error: {e}"),
    }
}
