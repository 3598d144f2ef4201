//! Test fixture utilities: load SSE streams and drive them through the normalizer

#![allow(dead_code)]

use futures_util::StreamExt;
use model_runtime::streaming::{
    ChunkData, RawEvent, StreamChunk, StreamContext, ToolCallAccumulator, decode_sse,
    normalize_events,
};
use model_runtime::transformers::StreamTransformer;
use model_runtime::types::ToolCall;
use std::io;
use std::sync::Arc;

/// Load an `.sse` fixture file and split it into SSE events (separated by blank lines), returning a byte stream
pub fn load_sse_fixture_as_bytes(path: &str) -> io::Result<Vec<Result<Vec<u8>, io::Error>>> {
    let raw = std::fs::read_to_string(path)?;
    let normalized = raw.replace("\r\n", "\n");
    let mut out = Vec::new();
    for chunk in normalized.split("\n\n") {
        let s = chunk.trim_end_matches('\n');
        if s.is_empty() {
            continue;
        }
        let mut owned = String::from(s);
        owned.push_str("\n\n");
        out.push(Ok(owned.into_bytes()));
    }
    Ok(out)
}

/// Normalize a fixture file with the given transformer.
pub async fn normalize_fixture(
    path: &str,
    transformer: Arc<dyn StreamTransformer>,
) -> Vec<StreamChunk> {
    let bytes = load_sse_fixture_as_bytes(path).expect("load fixture");
    let events = decode_sse(futures_util::stream::iter(bytes));
    normalize_events(events, transformer, StreamContext::new("fixture"))
        .collect()
        .await
}

/// Raw JSON payloads of a fixture, in order.
pub async fn fixture_values(path: &str) -> Vec<serde_json::Value> {
    let bytes = load_sse_fixture_as_bytes(path).expect("load fixture");
    decode_sse(futures_util::stream::iter(bytes))
        .filter_map(|event| async move {
            match event {
                RawEvent::Json(value) => Some(value),
                _ => None,
            }
        })
        .collect()
        .await
}

/// Content of a normalized stream, ignoring chunk boundaries.
#[derive(Debug, Default, PartialEq)]
pub struct Canonical {
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCall>,
}

pub fn canonical(chunks: &[StreamChunk]) -> Canonical {
    let mut out = Canonical::default();
    let mut tools = ToolCallAccumulator::new();
    for chunk in chunks {
        match &chunk.data {
            ChunkData::Text(t) => out.text.push_str(t),
            ChunkData::Reasoning(t) => out.reasoning.push_str(t),
            ChunkData::ToolCalls(deltas) => tools.extend(deltas),
            _ => {}
        }
    }
    out.tool_calls = tools.calls();
    out
}

pub fn event_types(chunks: &[StreamChunk]) -> Vec<&'static str> {
    chunks.iter().map(StreamChunk::event_type).collect()
}
