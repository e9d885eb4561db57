//! Chunk: index + timestamp + tagged payload + metadata.
//!
//! `ChunkData` is the tagged payload variant; `ChunkKind` is its fieldless
//! discriminant, used by stream filters without touching payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminant for [`ChunkData`]. Used by stream filter options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    Delta,
    Thought,
    ToolCall,
    ToolResult,
    Metadata,
    Error,
    Done,
    AgentStart,
    AgentComplete,
    Image,
    Audio,
    Video,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::Delta => "delta",
            ChunkKind::Thought => "thought",
            ChunkKind::ToolCall => "tool_call",
            ChunkKind::ToolResult => "tool_result",
            ChunkKind::Metadata => "metadata",
            ChunkKind::Error => "error",
            ChunkKind::Done => "done",
            ChunkKind::AgentStart => "agent_start",
            ChunkKind::AgentComplete => "agent_complete",
            ChunkKind::Image => "image",
            ChunkKind::Audio => "audio",
            ChunkKind::Video => "video",
        }
    }
}

/// Descriptor for a multimodal payload: a URL or inline data reference.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Location of the media (URL or provider-specific reference).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Error payload carried by an `error` chunk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkError {
    /// Stable error kind string (e.g. `llm_call_failed`, `cancelled`).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, String>,
}

/// Kind-specific chunk payload.
///
/// `text` carries a complete text block; `delta` an incremental token span.
/// `done` is terminal: it is the last chunk a reader observes on a clean
/// stream. An `error` chunk, when emitted, is also terminal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkData {
    Text {
        content: String,
    },
    Delta {
        content: String,
    },
    Thought {
        content: String,
    },
    ToolCall {
        name: String,
        arguments: HashMap<String, Value>,
        id: String,
    },
    ToolResult {
        name: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        id: String,
    },
    Metadata {
        data: Value,
    },
    Error {
        error: ChunkError,
    },
    Done,
    AgentStart {
        agent: String,
    },
    AgentComplete {
        agent: String,
        duration_ms: u64,
    },
    Image {
        media: MediaDescriptor,
    },
    Audio {
        media: MediaDescriptor,
    },
    Video {
        media: MediaDescriptor,
    },
}

impl ChunkData {
    pub fn kind(&self) -> ChunkKind {
        match self {
            ChunkData::Text { .. } => ChunkKind::Text,
            ChunkData::Delta { .. } => ChunkKind::Delta,
            ChunkData::Thought { .. } => ChunkKind::Thought,
            ChunkData::ToolCall { .. } => ChunkKind::ToolCall,
            ChunkData::ToolResult { .. } => ChunkKind::ToolResult,
            ChunkData::Metadata { .. } => ChunkKind::Metadata,
            ChunkData::Error { .. } => ChunkKind::Error,
            ChunkData::Done => ChunkKind::Done,
            ChunkData::AgentStart { .. } => ChunkKind::AgentStart,
            ChunkData::AgentComplete { .. } => ChunkKind::AgentComplete,
            ChunkData::Image { .. } => ChunkKind::Image,
            ChunkData::Audio { .. } => ChunkKind::Audio,
            ChunkData::Video { .. } => ChunkKind::Video,
        }
    }
}

/// One message in a run stream.
///
/// Indices are 0-based and strictly increasing within one stream; the
/// timestamp is stamped when the producer writes the chunk. The metadata map
/// is free-form and may be enriched by forwarding layers (workflow step tags,
/// sub-workflow path).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub data: ChunkData,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    pub fn kind(&self) -> ChunkKind {
        self.data.kind()
    }

    /// True for `done` and `error`: the last chunk a consumer observes.
    pub fn is_terminal(&self) -> bool {
        matches!(self.data, ChunkData::Done | ChunkData::Error { .. })
    }

    /// Textual payload of `text` and `delta` chunks; `None` for other kinds.
    pub fn text_payload(&self) -> Option<&str> {
        match &self.data {
            ChunkData::Text { content } | ChunkData::Delta { content } => Some(content),
            _ => None,
        }
    }
}
