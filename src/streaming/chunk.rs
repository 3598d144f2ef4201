//! Canonical chunk model
//!
//! Every per-provider transformer emits into this vocabulary and every
//! consumer reads from it.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::{ErrorKind, LlmError};
use crate::types::Usage;

/// Canonical stream of chunks. Errors travel in-band as [`ChunkData::Error`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// One canonical chunk: `{ id, type, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    #[serde(flatten)]
    pub data: ChunkData,
}

impl StreamChunk {
    pub fn new(id: impl Into<String>, data: ChunkData) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, ChunkData::Text(text.into()))
    }

    pub fn reasoning(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, ChunkData::Reasoning(text.into()))
    }

    pub fn stop(id: impl Into<String>, reason: FinishReason) -> Self {
        Self::new(id, ChunkData::Stop(reason))
    }

    pub fn error(id: impl Into<String>, error: ChunkError) -> Self {
        Self::new(id, ChunkData::Error(error))
    }

    /// Event name used by the SSE encoder.
    pub fn event_type(&self) -> &'static str {
        self.data.event_type()
    }

    /// True for chunks that carry user-visible content.
    pub fn is_content(&self) -> bool {
        matches!(
            self.data,
            ChunkData::Text(_)
                | ChunkData::Reasoning(_)
                | ChunkData::ToolCalls(_)
                | ChunkData::Base64Image(_)
                | ChunkData::Grounding(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChunkData {
    Text(String),
    Reasoning(String),
    /// Tool-call deltas keyed by a stable per-call index.
    ToolCalls(Vec<ToolCallDelta>),
    Usage(Usage),
    Grounding(Grounding),
    Base64Image(Base64Image),
    Stop(FinishReason),
    Error(ChunkError),
    /// Provider-specific payloads with no canonical meaning (e.g. thinking
    /// signatures).
    Data(serde_json::Value),
    /// Timing metrics emitted by the pipeline after usage.
    Speed(SpeedMetrics),
}

impl ChunkData {
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Reasoning(_) => "reasoning",
            Self::ToolCalls(_) => "tool_calls",
            Self::Usage(_) => "usage",
            Self::Grounding(_) => "grounding",
            Self::Base64Image(_) => "base64_image",
            Self::Stop(_) => "stop",
            Self::Error(_) => "error",
            Self::Data(_) => "data",
            Self::Speed(_) => "speed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    /// Graceful close after a caller abort; partial output is valid.
    Cancelled,
    Other(String),
}

impl FinishReason {
    /// Map provider finish / stop reasons (OpenAI, Anthropic, Google).
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" | "stop_sequence" | "STOP" | "FINISH_REASON_STOP" => Self::Stop,
            "length" | "max_tokens" | "MAX_TOKENS" => Self::Length,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolCalls,
            "content_filter" | "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
            | "refusal" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One tool-call fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    /// Present on every fragment once known for this index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental JSON arguments
    #[serde(default)]
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Base64Image {
    /// Full `data:` URI
    pub url: String,
}

impl Base64Image {
    pub fn from_parts(mime_type: &str, data: &str) -> Self {
        Self {
            url: format!("data:{mime_type};base64,{data}"),
        }
    }
}

/// In-band error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Offending raw chunk, for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl ChunkError {
    pub fn from_error(error: &LlmError, provider: Option<&str>) -> Self {
        Self {
            kind: error.kind(),
            message: error.message(),
            provider: provider.map(str::to_string),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn into_error(self) -> LlmError {
        let provider = self.provider.unwrap_or_else(|| "unknown".to_string());
        LlmError::from_kind(self.kind, provider, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedMetrics {
    /// Time to first token, milliseconds
    pub ttft_ms: u64,
    /// Output tokens per second
    pub tps: f64,
    /// Total stream latency, milliseconds
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chunk_serializes_as_type_id_data() {
        let chunk = StreamChunk::text("c1", "hi");
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"id": "c1", "type": "text", "data": "hi"})
        );
    }

    #[test]
    fn finish_reasons_map_across_providers() {
        assert_eq!(FinishReason::from_provider("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::from_provider("tool_use"), FinishReason::ToolCalls);
        assert_eq!(
            FinishReason::from_provider("weird"),
            FinishReason::Other("weird".into())
        );
    }
}
