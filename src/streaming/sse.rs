//! SSE handling
//!
//! - Inbound: provider SSE byte streams decoded with `eventsource-stream`
//!   into JSON values (`[DONE]` and empty events are skipped).
//! - Outbound: canonical chunks encoded as one SSE event each.

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};

use super::chunk::{ChunkStream, StreamChunk};

/// One decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// Parsed JSON payload
    Json(serde_json::Value),
    /// Payload that is not JSON
    Invalid { data: String, reason: String },
    /// Transport or framing failure
    TransportError(String),
}

/// Decode an SSE byte stream into JSON events.
pub fn decode_sse<S, B, E>(bytes: S) -> impl Stream<Item = RawEvent> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    bytes.eventsource().filter_map(|event| async move {
        match event {
            Ok(event) => {
                let data = event.data.trim();
                if data.is_empty() || data == "[DONE]" {
                    return None;
                }
                Some(match serde_json::from_str::<serde_json::Value>(data) {
                    Ok(json) => RawEvent::Json(json),
                    Err(e) => RawEvent::Invalid {
                        data: data.to_string(),
                        reason: e.to_string(),
                    },
                })
            }
            Err(e) => Some(RawEvent::TransportError(e.to_string())),
        }
    })
}

/// Encode one canonical chunk as an SSE event.
pub fn encode_chunk(chunk: &StreamChunk) -> String {
    let data = serde_json::to_value(chunk)
        .ok()
        .and_then(|v| v.get("data").cloned())
        .unwrap_or(serde_json::Value::Null);
    format!(
        "id: {}\nevent: {}\ndata: {}\n\n",
        chunk.id,
        chunk.event_type(),
        data
    )
}

/// Encode a canonical chunk stream as SSE bytes.
pub fn encode_stream(stream: ChunkStream) -> impl Stream<Item = Bytes> + Send {
    stream.map(|chunk| Bytes::from(encode_chunk(&chunk)))
}
