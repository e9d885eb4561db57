//! Stream metadata: fixed descriptors for the lifetime of one stream.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Describes one stream: who produces it, under which session/trace, and with
/// which model. Fixed once the stream is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// Name of the producing agent (or workflow).
    pub agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// When the stream was opened.
    pub started_at: DateTime<Utc>,
    /// Model name, empty for non-LLM producers (e.g. workflow streams).
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, String>,
}

impl StreamMetadata {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            session_id: None,
            trace_id: None,
            started_at: Utc::now(),
            model: String::new(),
            extra: HashMap::new(),
        }
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_trace_id(mut self, id: impl Into<String>) -> Self {
        self.trace_id = Some(id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let m = StreamMetadata::new("echo")
            .with_session_id("sess-1")
            .with_trace_id("trace-1")
            .with_model("gpt-test")
            .with_extra("k", "v");
        assert_eq!(m.agent_name, "echo");
        assert_eq!(m.session_id.as_deref(), Some("sess-1"));
        assert_eq!(m.trace_id.as_deref(), Some("trace-1"));
        assert_eq!(m.model, "gpt-test");
        assert_eq!(m.extra.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn optional_fields_are_skipped_in_json() {
        let m = StreamMetadata::new("echo");
        let v = serde_json::to_value(&m).unwrap();
        assert!(v.get("session_id").is_none());
        assert!(v.get("trace_id").is_none());
        assert_eq!(v["agent_name"], "echo");
    }
}
