//! `LlmAgent`: one-shot and streaming runs over an LLM with optional tools
//! and memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use stream_chunk::{ChunkData, ChunkError, StreamMetadata};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::metrics::AgentMetrics;
use crate::agent::tool_loop::run_tool_loop;
use crate::config::{AgentConfig, ToolConfig};
use crate::error::AgentError;
use crate::llm::{LlmClient, Prompt, TokenChunk};
use crate::memory::Memory;
use crate::options::{RunOptions, StreamOptions, ToolMode};
use crate::prompt::{enrich, EnrichedPrompt};
use crate::result::{LlmInteraction, RunResult, ToolExecution};
use crate::stream::ChunkStream;
use crate::toolcall::parse_tool_calls;
use crate::tools::{execute_call, Tool, ToolRegistry};
use crate::traits::{Agent, RunContext};

/// Capability view handed to a custom response handler.
#[derive(Clone, Debug)]
pub struct HandlerBridge {
    pub agent_name: String,
    pub capabilities: Vec<String>,
    pub session_id: Option<String>,
}

/// Custom handler invoked with the final text; a non-empty return overrides
/// it. Handler errors are logged and ignored.
pub type ResponseHandler =
    Arc<dyn Fn(&str, &HandlerBridge) -> Result<String, AgentError> + Send + Sync>;

/// LLM-backed agent. Construct through [`AgentBuilder`](crate::agent::AgentBuilder).
pub struct LlmAgent {
    config: AgentConfig,
    llm: Option<Arc<dyn LlmClient>>,
    memory: Option<Arc<dyn Memory>>,
    tools: Arc<ToolRegistry>,
    handler: Option<ResponseHandler>,
    metrics: Mutex<AgentMetrics>,
    /// Session ids seen by this agent, with last-use timestamps.
    sessions: DashMap<String, chrono::DateTime<Utc>>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for LlmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmAgent")
            .field("config", &self.config)
            .field("has_llm", &self.llm.is_some())
            .field("has_memory", &self.memory.is_some())
            .field("has_handler", &self.handler.is_some())
            .field("sessions", &self.sessions.len())
            .field(
                "initialized",
                &self.initialized.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl LlmAgent {
    pub(crate) fn assemble(
        config: AgentConfig,
        llm: Option<Arc<dyn LlmClient>>,
        memory: Option<Arc<dyn Memory>>,
        tools: Vec<Arc<dyn Tool>>,
        handler: Option<ResponseHandler>,
    ) -> Result<Self, AgentError> {
        config.validate()?;
        let registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(Self {
            config,
            llm,
            memory,
            tools: Arc::new(registry),
            handler,
            metrics: Mutex::new(AgentMetrics::default()),
            sessions: DashMap::new(),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn builder(name: impl Into<String>) -> crate::agent::AgentBuilder {
        crate::agent::AgentBuilder::new(name)
    }

    pub fn metrics(&self) -> AgentMetrics {
        self.metrics.lock().expect("agent metrics lock").clone()
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Tools available under the given mode, in registration order.
    fn selected_tools(&self, mode: Option<&ToolMode>) -> Vec<Arc<dyn Tool>> {
        match mode.unwrap_or(&ToolMode::Auto) {
            ToolMode::Auto => self.tools.all(),
            ToolMode::None => Vec::new(),
            ToolMode::Specific(names) => self
                .tools
                .all()
                .into_iter()
                .filter(|t| names.iter().any(|n| n == t.name()))
                .collect(),
        }
    }

    fn max_tool_iterations(&self) -> usize {
        self.config
            .tools
            .as_ref()
            .map(|t| t.max_tool_iterations)
            .unwrap_or_else(|| ToolConfig::default().max_tool_iterations)
    }

    /// Shared preparation for one-shot and streaming runs.
    async fn prepare(
        &self,
        ctx: &RunContext,
        input: &str,
        options: &RunOptions,
    ) -> Result<TurnSetup, AgentError> {
        let tools = self.selected_tools(options.tool_mode.as_ref());
        let mut system = self.config.system_prompt.clone();
        if !tools.is_empty() {
            system.push_str(&tool_description_block(&tools));
        }

        let session_id = options.session_id.clone().or_else(|| ctx.session_id.clone());
        let memory_enabled = options.memory_enabled.unwrap_or(true);
        let memory = if memory_enabled && self.config.memory.is_some() {
            self.memory.clone()
        } else {
            None
        };
        if let (Some(memory), Some(session)) = (&memory, &session_id) {
            self.sessions.insert(session.clone(), Utc::now());
            if let Err(e) = memory.set_session(session).await {
                warn!(error = %e, %session, "failed to select memory session");
            }
        }

        let memory_config = self.config.memory.clone().unwrap_or_default();
        let enriched = enrich(memory.as_deref(), &memory_config, &system, input).await?;

        let prompt = Prompt {
            system: enriched.system.clone(),
            user: enriched.user.clone(),
            temperature: options.temperature.or(self.config.llm.temperature),
            max_tokens: options.max_tokens.or(self.config.llm.max_tokens),
            attachments: options.attachments.clone(),
        };

        let trace_id = ctx.trace_id.clone().or_else(|| {
            options
                .include_trace
                .then(|| format!("trace-{}", uuid::Uuid::new_v4()))
        });

        Ok(TurnSetup {
            input: input.to_string(),
            prompt,
            tools,
            memory,
            enriched,
            session_id,
            trace_id,
        })
    }

    /// One user turn: LLM call, tool loop, memory writeback, handler,
    /// result assembly. Runs under `cancel`.
    async fn execute_turn(
        &self,
        llm: Arc<dyn LlmClient>,
        setup: TurnSetup,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunResult, AgentError> {
        let TurnSetup {
            input,
            prompt,
            tools,
            memory,
            enriched,
            session_id,
            trace_id,
        } = setup;
        let started_at = Utc::now();
        let memory_used = memory.is_some();

        let first_started = Instant::now();
        let first = llm.complete(&prompt).await?;
        let mut interactions = vec![LlmInteraction {
            model: self.config.llm.model.clone(),
            usage: first.usage,
            finish_reason: first.finish_reason.clone(),
            duration: first_started.elapsed(),
        }];
        let mut usage = first.usage;

        let (mut content, records, loop_error) = if tools.is_empty() {
            (first.content, Vec::new(), None)
        } else {
            let outcome = run_tool_loop(
                llm.as_ref(),
                &tools,
                &prompt,
                &self.config.llm.model,
                first.content,
                self.max_tool_iterations(),
                cancel,
            )
            .await;
            usage.add(outcome.usage);
            interactions.extend(outcome.interactions);
            for record in &outcome.records {
                self.tools.record(&record.name, record.success, record.duration);
            }
            (outcome.content, outcome.records, outcome.error)
        };

        if let Some(memory) = &memory {
            self.write_back(memory.as_ref(), &input, &content).await;
        }

        if let Some(handler) = &self.handler {
            let bridge = HandlerBridge {
                agent_name: self.config.name.clone(),
                capabilities: self.capabilities(),
                session_id: session_id.clone(),
            };
            // The handler is user code: a panic is caught and downgraded to a
            // handler_panic warning, like a returned error.
            let invoked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(&content, &bridge)
            }));
            match invoked {
                Ok(Ok(replacement)) if !replacement.is_empty() => content = replacement,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "response handler failed, keeping LLM output"),
                Err(payload) => {
                    let e = AgentError::HandlerPanic(crate::error::panic_message(
                        payload.as_ref(),
                    ));
                    warn!(error = %e, "response handler panicked, keeping LLM output");
                }
            }
        }

        let mut result = RunResult::new(content);
        result.started_at = started_at;
        result.usage = usage;
        result.llm_interactions = interactions;
        result.memory_used = memory_used;
        result.memory_queries = enriched.memory_queries;
        result.rag_context = enriched.rag_context;
        if !options.include_sources {
            if let Some(rag) = &mut result.rag_context {
                rag.sources.clear();
            }
        }
        result.session_id = session_id;
        result.trace_id = trace_id;
        result.tool_calls = records;
        if let Some(e) = loop_error {
            result.success = false;
            result
                .metadata
                .insert("error".to_string(), Value::String(e.to_string()));
            result.metadata.insert(
                "error_kind".to_string(),
                Value::String(e.kind().as_str().to_string()),
            );
        }
        if options.detailed_result {
            result.tool_executions = result.tool_calls.iter().map(ToolExecution::from).collect();
            let mut overrides = serde_json::Map::new();
            if let Some(t) = options.temperature {
                overrides.insert("temperature".into(), Value::from(t));
            }
            if let Some(n) = options.max_tokens {
                overrides.insert("max_tokens".into(), Value::from(n));
            }
            if let Some(t) = options.timeout {
                overrides.insert("timeout_ms".into(), Value::from(t.as_millis() as u64));
            }
            if !overrides.is_empty() {
                result
                    .metadata
                    .insert("config_overrides".to_string(), Value::Object(overrides));
            }
            if let Some(trace) = &result.trace_id {
                result
                    .metadata
                    .insert("trace_id".to_string(), Value::String(trace.clone()));
            }
        }
        result.finish();
        Ok(result)
    }

    /// Persists the final turn: two personal entries, two history messages.
    /// Failures are logged and never abort the run.
    async fn write_back(&self, memory: &dyn Memory, input: &str, output: &str) {
        if let Err(e) = memory.store(input, "user_message", &self.config.name).await {
            warn!(error = %e, "failed to store user message");
        }
        if let Err(e) = memory.store(output, "agent_response", &self.config.name).await {
            warn!(error = %e, "failed to store agent response");
        }
        if let Err(e) = memory.add_message("user", input).await {
            warn!(error = %e, "failed to append user turn");
        }
        if let Err(e) = memory.add_message("assistant", output).await {
            warn!(error = %e, "failed to append assistant turn");
        }
    }
}

/// Prepared inputs for one turn.
struct TurnSetup {
    /// Raw user input, as given; memory writeback stores this, not the
    /// enriched prompt text.
    input: String,
    prompt: Prompt,
    tools: Vec<Arc<dyn Tool>>,
    memory: Option<Arc<dyn Memory>>,
    enriched: EnrichedPrompt,
    session_id: Option<String>,
    trace_id: Option<String>,
}

/// Tool block appended to the system prompt: names, descriptions, and the
/// invocation syntaxes the parser accepts.
fn tool_description_block(tools: &[Arc<dyn Tool>]) -> String {
    let mut block = String::from("\n\nAvailable tools:\n");
    for tool in tools {
        block.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
    }
    block.push_str(
        "\nTo call a tool, reply with a single line `tool_name(arg=\"value\")`, \
         or `TOOL_CALL {\"name\": \"tool_name\", \"arguments\": {...}}`.",
    );
    block
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn capabilities(&self) -> Vec<String> {
        let mut caps = vec!["llm".to_string(), "streaming".to_string()];
        if self.memory.is_some() && self.config.memory.is_some() {
            caps.push("memory".to_string());
            if self
                .config
                .memory
                .as_ref()
                .is_some_and(|m| m.rag.is_some())
            {
                caps.push("rag".to_string());
            }
        }
        if !self.tools.is_empty() {
            caps.push("tools".to_string());
        }
        if self.handler.is_some() {
            caps.push("custom_handler".to_string());
        }
        caps
    }

    async fn initialize(&self) -> Result<(), AgentError> {
        self.config.validate()?;
        if self.llm.is_none() {
            return Err(AgentError::NotInitialized(self.config.name.clone()));
        }
        self.initialized.store(true, Ordering::SeqCst);
        debug!(agent = %self.config.name, "agent initialized");
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AgentError> {
        self.initialized.store(false, Ordering::SeqCst);
        if let Some(memory) = &self.memory {
            memory.close().await?;
        }
        Ok(())
    }

    async fn run_with_options(
        &self,
        ctx: &RunContext,
        input: &str,
        options: RunOptions,
    ) -> Result<RunResult, AgentError> {
        let llm = match (&self.llm, self.initialized.load(Ordering::SeqCst)) {
            (Some(llm), true) => Arc::clone(llm),
            _ => return Err(AgentError::NotInitialized(self.config.name.clone())),
        };
        let started = Instant::now();
        let cancel = ctx.cancel.child_token();
        let timeout = options.timeout.or(self.config.timeout);

        let outcome = {
            let turn = async {
                let setup = self.prepare(ctx, input, &options).await?;
                self.execute_turn(llm, setup, &options, &cancel).await
            };
            match timeout {
                Some(limit) => tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        Err(AgentError::Cancelled("run context cancelled".into()))
                    }
                    _ = tokio::time::sleep(limit) => Err(AgentError::Timeout(limit)),
                    outcome = turn => outcome,
                },
                None => tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        Err(AgentError::Cancelled("run context cancelled".into()))
                    }
                    outcome = turn => outcome,
                },
            }
        };
        cancel.cancel();

        let success = outcome.as_ref().map(|r| r.success).unwrap_or(false);
        self.metrics
            .lock()
            .expect("agent metrics lock")
            .record_run(started.elapsed(), success);
        outcome
    }

    async fn run_stream(
        &self,
        ctx: &RunContext,
        input: &str,
        options: StreamOptions,
    ) -> Result<ChunkStream, AgentError> {
        self.run_stream_with_options(
            ctx,
            input,
            RunOptions::default().with_streaming(options),
        )
        .await
    }

    /// Streaming run: thought chunk, forwarded deltas, a single tool pass
    /// surfaced as `tool_call`/`tool_result` chunks, then `done` and the
    /// terminal result. Tool results are not fed back to the LLM here.
    async fn run_stream_with_options(
        &self,
        ctx: &RunContext,
        input: &str,
        options: RunOptions,
    ) -> Result<ChunkStream, AgentError> {
        let llm = match (&self.llm, self.initialized.load(Ordering::SeqCst)) {
            (Some(llm), true) => Arc::clone(llm),
            _ => return Err(AgentError::NotInitialized(self.config.name.clone())),
        };
        let stream_options = options.streaming.clone().unwrap_or_default();
        let setup = self.prepare(ctx, input, &options).await?;

        let mut metadata = StreamMetadata::new(&self.config.name)
            .with_model(self.config.llm.model.clone());
        metadata.session_id = setup.session_id.clone();
        metadata.trace_id = setup.trace_id.clone();

        let flush_interval = stream_options.flush_interval;
        let (stream, writer) = ChunkStream::channel(metadata, stream_options, &ctx.cancel);

        let model = self.config.llm.model.clone();
        let registry = Arc::clone(&self.tools);
        let memory = setup.memory.clone();
        let agent_name = self.config.name.clone();
        let input = input.to_string();
        let TurnSetup {
            prompt,
            tools,
            enriched,
            session_id,
            trace_id,
            ..
        } = setup;

        tokio::spawn(async move {
            let started_at = Utc::now();
            let started = Instant::now();
            let summary: String = input.chars().take(80).collect();
            if writer
                .write(ChunkData::Thought {
                    content: format!("Processing: {summary}"),
                })
                .await
                .is_err()
            {
                writer.close();
                return;
            }

            let (token_tx, mut token_rx) = mpsc::channel::<TokenChunk>(64);
            let llm_call = llm.complete_stream(&prompt, Some(token_tx));
            let writer_ref = &writer;
            let forward = async move {
                let mut pending = String::new();
                let mut last_flush = Instant::now();
                let mut failure = None;
                while let Some(token) = token_rx.recv().await {
                    let delta = match flush_interval {
                        Some(interval) => {
                            pending.push_str(&token.content);
                            if last_flush.elapsed() < interval {
                                continue;
                            }
                            last_flush = Instant::now();
                            std::mem::take(&mut pending)
                        }
                        None => token.content,
                    };
                    if let Err(e) = writer_ref.write(ChunkData::Delta { content: delta }).await {
                        failure = Some(e);
                        break;
                    }
                }
                // Closing the token channel lets the LLM call finish even
                // when forwarding stopped early.
                drop(token_rx);
                if let Some(e) = failure {
                    return Err(e);
                }
                if !pending.is_empty() {
                    writer_ref
                        .write(ChunkData::Delta { content: pending })
                        .await?;
                }
                Ok::<(), AgentError>(())
            };
            // Cancellation must also abort the LLM call itself, not just the
            // forwarding loop, or a cancelled consumer leaves the producer
            // joined on an LLM that keeps streaming into a full channel.
            let stream_cancel = writer.cancellation();
            let joined = tokio::select! {
                _ = stream_cancel.cancelled() => None,
                pair = async { tokio::join!(llm_call, forward) } => Some(pair),
            };
            let Some((reply, forwarded)) = joined else {
                writer.close();
                return;
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    let _ = writer
                        .write(ChunkData::Error {
                            error: ChunkError {
                                kind: e.kind().as_str().to_string(),
                                message: e.to_string(),
                                details: e.details(),
                            },
                        })
                        .await;
                    writer.close_with_error(e);
                    return;
                }
            };
            if forwarded.is_err() {
                // Cancelled while forwarding deltas; the stored error
                // surfaces through wait().
                writer.close();
                return;
            }

            let calls = if tools.is_empty() {
                Vec::new()
            } else {
                parse_tool_calls(&reply.content)
            };
            let mut records = Vec::new();
            for call in calls {
                if writer
                    .write(ChunkData::ToolCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        id: call.id.clone(),
                    })
                    .await
                    .is_err()
                {
                    writer.close();
                    return;
                }
                let record = execute_call(&tools, &call, &writer.cancellation()).await;
                registry.record(&record.name, record.success, record.duration);
                let result_chunk = ChunkData::ToolResult {
                    name: record.name.clone(),
                    content: match &record.result {
                        Some(Value::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    },
                    error: (!record.success).then(|| record.error.clone()),
                    id: call.id.clone(),
                };
                if writer.write(result_chunk).await.is_err() {
                    writer.close();
                    return;
                }
                records.push(record);
            }

            if let Some(memory) = &memory {
                if let Err(e) = memory.store(&input, "user_message", &agent_name).await {
                    warn!(error = %e, "failed to store user message");
                }
                if let Err(e) = memory
                    .store(&reply.content, "agent_response", &agent_name)
                    .await
                {
                    warn!(error = %e, "failed to store agent response");
                }
                if let Err(e) = memory.add_message("user", &input).await {
                    warn!(error = %e, "failed to append user turn");
                }
                if let Err(e) = memory.add_message("assistant", &reply.content).await {
                    warn!(error = %e, "failed to append assistant turn");
                }
            }

            let mut result = RunResult::new(reply.content.clone());
            result.started_at = started_at;
            result.usage = reply.usage;
            result.llm_interactions = vec![LlmInteraction {
                model,
                usage: reply.usage,
                finish_reason: reply.finish_reason,
                duration: started.elapsed(),
            }];
            result.memory_used = memory.is_some();
            result.memory_queries = enriched.memory_queries;
            result.rag_context = enriched.rag_context;
            result.session_id = session_id;
            result.trace_id = trace_id;
            result.tool_calls = records;
            result.finish();

            writer.set_result(result);
            let _ = writer.write(ChunkData::Done).await;
            writer.close();
        });

        Ok(stream)
    }
}
