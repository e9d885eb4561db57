//! Tool executor: resolve one parsed call, run it, record the outcome.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::result::ToolCallRecord;
use crate::toolcall::ParsedToolCall;
use crate::tools::Tool;

/// Executes one parsed tool call against the given ordered tool list.
///
/// Lookup is first exact name match; a missing tool yields a failed record
/// rather than an error. The output's `success`/`content`/`error` are copied
/// verbatim into the record; duration is measured around the call. The call
/// runs under the given cancellation scope.
pub async fn execute_call(
    tools: &[Arc<dyn Tool>],
    call: &ParsedToolCall,
    cancel: &CancellationToken,
) -> ToolCallRecord {
    let started = Instant::now();
    let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
        return ToolCallRecord::failed(
            call.name.clone(),
            call.arguments.clone(),
            format!("tool not found: {}", call.name),
            started.elapsed(),
        );
    };

    debug!(tool = %call.name, "executing tool call");
    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            return ToolCallRecord::failed(
                call.name.clone(),
                call.arguments.clone(),
                "cancelled before completion",
                started.elapsed(),
            );
        }
        outcome = tool.execute(&call.arguments) => outcome,
    };
    let duration = started.elapsed();

    match outcome {
        Ok(output) if output.success => ToolCallRecord::succeeded(
            call.name.clone(),
            call.arguments.clone(),
            Value::String(output.content),
            duration,
        ),
        Ok(output) => {
            let mut record = ToolCallRecord::failed(
                call.name.clone(),
                call.arguments.clone(),
                output
                    .error
                    .unwrap_or_else(|| "tool reported failure without error".to_string()),
                duration,
            );
            if !output.content.is_empty() {
                record.result = Some(Value::String(output.content));
            }
            record
        }
        Err(e) => ToolCallRecord::failed(
            call.name.clone(),
            call.arguments.clone(),
            e.to_string(),
            duration,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::tools::ToolOutput;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct AddTool;

    #[async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "add"
        }
        fn description(&self) -> &str {
            "adds two numbers"
        }
        async fn execute(
            &self,
            args: &HashMap<String, Value>,
        ) -> Result<ToolOutput, AgentError> {
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

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always raises"
        }
        async fn execute(
            &self,
            _args: &HashMap<String, Value>,
        ) -> Result<ToolOutput, AgentError> {
            Err(AgentError::ToolExecute {
                name: "broken".into(),
                message: "exploded".into(),
            })
        }
    }

    struct PendingTool;

    #[async_trait]
    impl Tool for PendingTool {
        fn name(&self) -> &str {
            "pending"
        }
        fn description(&self) -> &str {
            "never finishes"
        }
        async fn execute(
            &self,
            _args: &HashMap<String, Value>,
        ) -> Result<ToolOutput, AgentError> {
            std::future::pending().await
        }
    }

    fn call(name: &str, args: &[(&str, &str)]) -> ParsedToolCall {
        let calls = crate::toolcall::parse_tool_calls(&format!(
            "{name}({})",
            args.iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        calls.into_iter().next().expect("parsed call")
    }

    /// **Scenario**: a successful execution copies the output verbatim.
    #[tokio::test]
    async fn success_is_recorded_verbatim() {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(AddTool)];
        let record = execute_call(
            &tools,
            &call("add", &[("a", "3"), ("b", "4")]),
            &CancellationToken::new(),
        )
        .await;
        assert!(record.success);
        assert_eq!(record.result, Some(Value::String("7".into())));
        assert!(record.error.is_empty());
    }

    /// **Scenario**: missing tool yields a failed record with the
    /// distinguished message, not an error.
    #[tokio::test]
    async fn missing_tool_yields_failed_record() {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(AddTool)];
        let record = execute_call(
            &tools,
            &call("subtract", &[("a", "3")]),
            &CancellationToken::new(),
        )
        .await;
        assert!(!record.success);
        assert_eq!(record.error, "tool not found: subtract");
        assert!(record.result.is_none());
    }

    /// **Scenario**: a domain failure copies the tool's error string.
    #[tokio::test]
    async fn domain_failure_copies_error() {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(AddTool)];
        let record = execute_call(
            &tools,
            &call("add", &[("a", "x"), ("b", "4")]),
            &CancellationToken::new(),
        )
        .await;
        assert!(!record.success);
        assert_eq!(record.error, "a and b must be integers");
    }

    /// **Scenario**: an execute error becomes a failed record.
    #[tokio::test]
    async fn execute_error_becomes_failed_record() {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(BrokenTool)];
        let record =
            execute_call(&tools, &call("broken", &[]), &CancellationToken::new()).await;
        assert!(!record.success);
        assert!(record.error.contains("exploded"));
    }

    /// **Scenario**: cancellation interrupts a pending tool.
    #[tokio::test]
    async fn cancellation_interrupts_pending_tool() {
        let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(PendingTool)];
        let cancel = CancellationToken::new();
        let parsed = call("pending", &[]);
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });
        let record = execute_call(&tools, &parsed, &cancel).await;
        assert!(!record.success);
        assert!(record.error.contains("cancelled"));
    }
}
