//! Error taxonomy for agent and workflow execution.
//!
//! Every error carries a stable [`ErrorKind`] so callers can branch on kind
//! without string matching, plus fatal/retryable classification. Memory and
//! custom-handler failures are recovered locally by the agent loop (logged,
//! execution continues); everything else surfaces through `Result`.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Stable error kind, one per [`AgentError`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigInvalid,
    ConfigMissing,
    NotInitialized,
    LlmCall,
    LlmAuth,
    LlmQuota,
    ToolNotFound,
    ToolExecute,
    ToolTimeout,
    MemoryStore,
    MemoryQuery,
    MemoryConnection,
    StepFailed,
    Deadlock,
    MaxIterations,
    RecursionLimit,
    Timeout,
    Cancelled,
    Handler,
    HandlerPanic,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConfigInvalid => "config_invalid",
            ErrorKind::ConfigMissing => "config_missing",
            ErrorKind::NotInitialized => "agent_not_initialized",
            ErrorKind::LlmCall => "llm_call_failed",
            ErrorKind::LlmAuth => "llm_auth",
            ErrorKind::LlmQuota => "llm_quota_exceeded",
            ErrorKind::ToolNotFound => "tool_not_found",
            ErrorKind::ToolExecute => "tool_execute",
            ErrorKind::ToolTimeout => "tool_timeout",
            ErrorKind::MemoryStore => "memory_store",
            ErrorKind::MemoryQuery => "memory_query",
            ErrorKind::MemoryConnection => "memory_connection",
            ErrorKind::StepFailed => "workflow_step_failed",
            ErrorKind::Deadlock => "workflow_deadlock",
            ErrorKind::MaxIterations => "workflow_max_iterations",
            ErrorKind::RecursionLimit => "recursion_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Handler => "handler_failed",
            ErrorKind::HandlerPanic => "handler_panic",
        }
    }
}

/// Agent and workflow execution error.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    /// Run was called on an agent without an LLM bound.
    #[error("agent {0} is not initialized (no LLM bound)")]
    NotInitialized(String),

    #[error("llm call failed: {0}")]
    LlmCall(String),

    #[error("llm authentication failed: {0}")]
    LlmAuth(String),

    #[error("llm quota exceeded: {0}")]
    LlmQuota(String),

    /// A parsed tool name is not registered with the agent.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool {name} failed: {message}")]
    ToolExecute { name: String, message: String },

    #[error("tool {0} exceeded its time budget")]
    ToolTimeout(String),

    #[error("memory store failed: {0}")]
    MemoryStore(String),

    #[error("memory query failed: {0}")]
    MemoryQuery(String),

    #[error("memory connection failed: {0}")]
    MemoryConnection(String),

    /// A workflow step returned an error; wraps the step's own error.
    #[error("step {name} failed (index {index}): {source}")]
    StepFailed {
        name: String,
        index: usize,
        #[source]
        source: Box<AgentError>,
    },

    /// DAG scheduling made no progress: circular or missing dependencies.
    #[error("workflow deadlock: {0}")]
    Deadlock(String),

    #[error("workflow reached max iterations ({0})")]
    MaxIterations(usize),

    /// Sub-workflow nesting exceeded `max_depth`; `path` is the full
    /// `parent/child/...` chain that was rejected.
    #[error("recursion limit exceeded at {path}: depth {depth} >= max {max_depth}")]
    RecursionLimit {
        path: String,
        depth: usize,
        max_depth: usize,
    },

    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("handler failed: {0}")]
    Handler(String),

    /// A custom handler panicked; the panic was caught and downgraded.
    #[error("handler panicked: {0}")]
    HandlerPanic(String),
}

/// Renders a caught panic payload for logs and error messages.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            AgentError::ConfigMissing(_) => ErrorKind::ConfigMissing,
            AgentError::NotInitialized(_) => ErrorKind::NotInitialized,
            AgentError::LlmCall(_) => ErrorKind::LlmCall,
            AgentError::LlmAuth(_) => ErrorKind::LlmAuth,
            AgentError::LlmQuota(_) => ErrorKind::LlmQuota,
            AgentError::ToolNotFound(_) => ErrorKind::ToolNotFound,
            AgentError::ToolExecute { .. } => ErrorKind::ToolExecute,
            AgentError::ToolTimeout(_) => ErrorKind::ToolTimeout,
            AgentError::MemoryStore(_) => ErrorKind::MemoryStore,
            AgentError::MemoryQuery(_) => ErrorKind::MemoryQuery,
            AgentError::MemoryConnection(_) => ErrorKind::MemoryConnection,
            AgentError::StepFailed { .. } => ErrorKind::StepFailed,
            AgentError::Deadlock(_) => ErrorKind::Deadlock,
            AgentError::MaxIterations(_) => ErrorKind::MaxIterations,
            AgentError::RecursionLimit { .. } => ErrorKind::RecursionLimit,
            AgentError::Timeout(_) => ErrorKind::Timeout,
            AgentError::Cancelled(_) => ErrorKind::Cancelled,
            AgentError::Handler(_) => ErrorKind::Handler,
            AgentError::HandlerPanic(_) => ErrorKind::HandlerPanic,
        }
    }

    /// Fatal errors are not worth retrying at any level: bad configuration,
    /// auth/quota problems, deadlocked graphs, exceeded recursion bounds.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConfigInvalid
                | ErrorKind::ConfigMissing
                | ErrorKind::NotInitialized
                | ErrorKind::LlmAuth
                | ErrorKind::LlmQuota
                | ErrorKind::Deadlock
                | ErrorKind::RecursionLimit
        )
    }

    /// Transient errors where a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::LlmCall
                | ErrorKind::Timeout
                | ErrorKind::ToolExecute
                | ErrorKind::ToolTimeout
                | ErrorKind::MemoryStore
                | ErrorKind::MemoryQuery
                | ErrorKind::MemoryConnection
        )
    }

    /// Structured fields of this error, for error chunks and result metadata.
    pub fn details(&self) -> HashMap<String, String> {
        let mut details = HashMap::new();
        match self {
            AgentError::StepFailed { name, index, .. } => {
                details.insert("step_name".to_string(), name.clone());
                details.insert("step_index".to_string(), index.to_string());
            }
            AgentError::RecursionLimit {
                path,
                depth,
                max_depth,
            } => {
                details.insert("path".to_string(), path.clone());
                details.insert("depth".to_string(), depth.to_string());
                details.insert("max_depth".to_string(), max_depth.to_string());
            }
            AgentError::ToolExecute { name, .. } | AgentError::ToolTimeout(name) => {
                details.insert("tool".to_string(), name.clone());
            }
            AgentError::MaxIterations(n) => {
                details.insert("max_iterations".to_string(), n.to_string());
            }
            _ => {}
        }
        details
    }
}
