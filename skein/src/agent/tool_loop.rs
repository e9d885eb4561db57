//! The agentic tool loop: LLM reply → parse calls → execute → feed results
//! back → repeat, bounded by `max_tool_iterations`.
//!
//! Modeled as an explicit state machine rather than a plain loop so the
//! transition set stays visible: `AwaitingTools` parses and executes,
//! `AwaitingLlm` re-invokes the model with the results, `Done` carries the
//! final text. The iteration cap counts continuation LLM calls, so the total
//! number of LLM calls per run is at most `1 + max_tool_iterations`.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AgentError;
use crate::llm::{LlmClient, Prompt};
use crate::result::{LlmInteraction, TokenUsage, ToolCallRecord};
use crate::toolcall::parse_tool_calls;
use crate::tools::{execute_call, Tool};

/// Final state of one loop run. When the LLM fails mid-loop, `content` is the
/// most recent valid reply and `error` carries the failure.
pub(crate) struct ToolLoopOutcome {
    pub content: String,
    pub records: Vec<ToolCallRecord>,
    pub interactions: Vec<LlmInteraction>,
    pub usage: TokenUsage,
    pub error: Option<AgentError>,
}

enum LoopPhase {
    /// Have a reply; parse it and execute any calls.
    AwaitingTools { reply: String },
    /// Have tool results; re-invoke the LLM with the continuation prompt.
    AwaitingLlm { user: String, previous: String },
    Done { content: String },
}

/// Drives the loop starting from the LLM's first reply.
pub(crate) async fn run_tool_loop(
    llm: &dyn LlmClient,
    tools: &[Arc<dyn Tool>],
    base: &Prompt,
    model: &str,
    first_reply: String,
    max_iterations: usize,
    cancel: &CancellationToken,
) -> ToolLoopOutcome {
    let mut records: Vec<ToolCallRecord> = Vec::new();
    let mut interactions: Vec<LlmInteraction> = Vec::new();
    let mut usage = TokenUsage::default();
    let mut iterations = 0usize;
    let mut phase = LoopPhase::AwaitingTools { reply: first_reply };

    loop {
        phase = match phase {
            LoopPhase::AwaitingTools { reply } => {
                let calls = parse_tool_calls(&reply);
                if calls.is_empty() {
                    LoopPhase::Done { content: reply }
                } else if iterations >= max_iterations {
                    debug!(iterations, "tool loop cap reached, keeping last reply");
                    LoopPhase::Done { content: reply }
                } else {
                    let first_new = records.len();
                    for call in &calls {
                        records.push(execute_call(tools, call, cancel).await);
                    }
                    let user = continuation_user(&reply, &records[first_new..]);
                    LoopPhase::AwaitingLlm {
                        user,
                        previous: reply,
                    }
                }
            }
            LoopPhase::AwaitingLlm { user, previous } => {
                let prompt = Prompt {
                    system: base.system.clone(),
                    user,
                    temperature: base.temperature,
                    max_tokens: base.max_tokens,
                    attachments: Vec::new(),
                };
                let started = Instant::now();
                match llm.complete(&prompt).await {
                    Ok(reply) => {
                        iterations += 1;
                        usage.add(reply.usage);
                        interactions.push(LlmInteraction {
                            model: model.to_string(),
                            usage: reply.usage,
                            finish_reason: reply.finish_reason,
                            duration: started.elapsed(),
                        });
                        LoopPhase::AwaitingTools {
                            reply: reply.content,
                        }
                    }
                    Err(e) => {
                        return ToolLoopOutcome {
                            content: previous,
                            records,
                            interactions,
                            usage,
                            error: Some(e),
                        };
                    }
                }
            }
            LoopPhase::Done { content } => {
                return ToolLoopOutcome {
                    content,
                    records,
                    interactions,
                    usage,
                    error: None,
                };
            }
        };
    }
}

/// Continuation prompt: previous reply, a tool results section, and the
/// instruction to continue.
fn continuation_user(reply: &str, records: &[ToolCallRecord]) -> String {
    let mut user = String::from(reply);
    user.push_str("\n\nTool execution results:\n");
    for record in records {
        if record.success {
            let result = match &record.result {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            user.push_str(&format!("- {}: {}\n", record.name, result));
        } else {
            user.push_str(&format!("- {}: error: {}\n", record.name, record.error));
        }
    }
    user.push_str("\nPlease continue with your response based on the tool results.");
    user
}
