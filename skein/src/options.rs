//! Per-run options: overrides applied to one `run` / `run_stream` invocation
//! without touching the agent's configuration.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use stream_chunk::{Chunk, ChunkKind, MediaDescriptor};

/// Default stream buffer capacity (chunks).
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Which tools a run may use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ToolMode {
    /// All registered tools are available.
    #[default]
    Auto,
    /// Only the named tools are available.
    Specific(Vec<String>),
    /// No tools, even if the agent has some registered.
    None,
}

/// A multimodal attachment passed along with the prompt.
#[derive(Clone, Debug, PartialEq)]
pub enum Attachment {
    Image(MediaDescriptor),
    Audio(MediaDescriptor),
    Video(MediaDescriptor),
}

impl Attachment {
    pub fn descriptor(&self) -> &MediaDescriptor {
        match self {
            Attachment::Image(d) | Attachment::Audio(d) | Attachment::Video(d) => d,
        }
    }
}

/// Callback invoked for each chunk before it is sent on the channel.
/// Returning `false` cancels the stream.
pub type ChunkHandler = Arc<dyn Fn(&Chunk) -> bool + Send + Sync>;

/// Options fixed at stream creation: buffering, filtering, callbacks, timing.
#[derive(Clone)]
pub struct StreamOptions {
    /// Channel capacity; writers block when the consumer lags this far behind.
    pub buffer_capacity: usize,
    pub include_thoughts: bool,
    /// Gates `tool_call` and `tool_result` chunks.
    pub include_tool_activity: bool,
    pub include_metadata: bool,
    /// Drop everything but `text`, `delta`, and `done`.
    pub text_only: bool,
    pub handler: Option<ChunkHandler>,
    /// When set, producers coalesce consecutive deltas within this interval.
    pub flush_interval: Option<Duration>,
    /// Overall stream deadline; surfaces as a `timeout` error through `wait`.
    pub timeout: Option<Duration>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            include_thoughts: true,
            include_tool_activity: true,
            include_metadata: true,
            text_only: false,
            handler: None,
            flush_interval: None,
            timeout: None,
        }
    }
}

impl StreamOptions {
    pub fn text_only() -> Self {
        Self {
            text_only: true,
            ..Self::default()
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn with_thoughts(mut self, include: bool) -> Self {
        self.include_thoughts = include;
        self
    }

    pub fn with_tool_activity(mut self, include: bool) -> Self {
        self.include_tool_activity = include;
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn with_handler(
        mut self,
        handler: impl Fn(&Chunk) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = Some(interval);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Filtering decision for one chunk kind. Filtered chunks are silently
    /// dropped by the writer and consume no index.
    pub fn allows(&self, kind: ChunkKind) -> bool {
        if self.text_only {
            return matches!(kind, ChunkKind::Text | ChunkKind::Delta | ChunkKind::Done);
        }
        match kind {
            ChunkKind::Thought => self.include_thoughts,
            ChunkKind::ToolCall | ChunkKind::ToolResult => self.include_tool_activity,
            ChunkKind::Metadata => self.include_metadata,
            _ => true,
        }
    }
}

impl Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("buffer_capacity", &self.buffer_capacity)
            .field("include_thoughts", &self.include_thoughts)
            .field("include_tool_activity", &self.include_tool_activity)
            .field("include_metadata", &self.include_metadata)
            .field("text_only", &self.text_only)
            .field("has_handler", &self.handler.is_some())
            .field("flush_interval", &self.flush_interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Per-invocation overrides. Every field is optional; `None`/`false` means
/// "use the agent's configured behavior".
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub timeout: Option<Duration>,
    pub session_id: Option<String>,
    pub tool_mode: Option<ToolMode>,
    pub memory_enabled: Option<bool>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub include_trace: bool,
    pub detailed_result: bool,
    pub include_sources: bool,
    pub streaming: Option<StreamOptions>,
    pub attachments: Vec<Attachment>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_tool_mode(mut self, mode: ToolMode) -> Self {
        self.tool_mode = Some(mode);
        self
    }

    pub fn with_memory_enabled(mut self, enabled: bool) -> Self {
        self.memory_enabled = Some(enabled);
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    pub fn with_trace(mut self) -> Self {
        self.include_trace = true;
        self
    }

    pub fn detailed(mut self) -> Self {
        self.detailed_result = true;
        self
    }

    pub fn with_sources(mut self) -> Self {
        self.include_sources = true;
        self
    }

    pub fn with_streaming(mut self, options: StreamOptions) -> Self {
        self.streaming = Some(options);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}
