//! Anthropic Messages stream events
//!
//! `message_start → content_block_start / content_block_delta /
//! content_block_stop → message_delta → message_stop`. The same events are
//! produced by the non-streaming replay in `providers::anthropic::replay`.

use serde_json::Value;

use super::business_error::detect_embedded_error;
use super::{StreamTransformer, str_at};
use crate::error::LlmError;
use crate::streaming::{
    ChunkData, Citation, FinishReason, Grounding, StreamChunk, StreamContext, ToolCallDelta,
    ToolSlot,
};
use crate::types::Usage;

#[derive(Debug, Clone)]
pub struct AnthropicStreamTransformer {
    provider: String,
}

impl AnthropicStreamTransformer {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl Default for AnthropicStreamTransformer {
    fn default() -> Self {
        Self::new("anthropic")
    }
}

/// Parse an Anthropic `usage` object (`input_tokens`, `output_tokens`,
/// cache counters).
pub fn parse_usage(value: &Value) -> Usage {
    let count = |key: &str| value.get(key).and_then(Value::as_u64).unwrap_or(0) as u32;
    let cache_read = count("cache_read_input_tokens");
    let cache_write = count("cache_creation_input_tokens");
    let mut usage = Usage::new(count("input_tokens") + cache_read + cache_write, count("output_tokens"));
    if cache_read > 0 {
        usage.cached_tokens = Some(cache_read);
    }
    usage
}

impl StreamTransformer for AnthropicStreamTransformer {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn transform(&self, raw: &Value, ctx: &mut StreamContext) -> Result<Vec<StreamChunk>, LlmError> {
        if let Some(error) = detect_embedded_error(&self.provider, raw) {
            return Ok(vec![StreamChunk::error(ctx.id.clone(), error)]);
        }
        let event_type = str_at(raw, "/type")
            .ok_or_else(|| LlmError::StreamParseError("event without type".to_string()))?;

        let chunks = match event_type {
            "message_start" => {
                ctx.adopt_id(str_at(raw, "/message/id"));
                ctx.usage = raw.pointer("/message/usage").map(parse_usage);
                Vec::new()
            }
            "content_block_start" => self.block_start(raw, ctx)?,
            "content_block_delta" => self.block_delta(raw, ctx)?,
            "message_delta" => {
                let mut out = Vec::new();
                if let Some(delta_usage) = raw.get("usage") {
                    let mut usage = ctx.usage.take().unwrap_or_default();
                    usage.merge(&parse_usage(delta_usage));
                    out.push(StreamChunk::new(ctx.id.clone(), ChunkData::Usage(usage)));
                }
                if let Some(reason) = str_at(raw, "/delta/stop_reason") {
                    out.push(StreamChunk::stop(
                        ctx.id.clone(),
                        FinishReason::from_provider(reason),
                    ));
                }
                out
            }
            "content_block_stop" | "message_stop" | "ping" => Vec::new(),
            other => {
                tracing::trace!(event = other, "ignoring anthropic event");
                Vec::new()
            }
        };
        Ok(chunks)
    }
}

impl AnthropicStreamTransformer {
    fn block_start(&self, raw: &Value, ctx: &mut StreamContext) -> Result<Vec<StreamChunk>, LlmError> {
        let index = block_index(raw)?;
        let block = raw
            .get("content_block")
            .ok_or_else(|| LlmError::StreamParseError("content_block_start without block".into()))?;
        let block_type = str_at(block, "/type").unwrap_or("text");
        ctx.block_types.insert(index, block_type.to_string());

        let id = ctx.id.clone();
        let chunks = match block_type {
            "text" => str_at(block, "/text")
                .filter(|t| !t.is_empty())
                .map(|t| vec![StreamChunk::text(id, t)])
                .unwrap_or_default(),
            "thinking" => str_at(block, "/thinking")
                .filter(|t| !t.is_empty())
                .map(|t| vec![StreamChunk::reasoning(id, t)])
                .unwrap_or_default(),
            "redacted_thinking" => vec![StreamChunk::new(
                id,
                ChunkData::Data(serde_json::json!({
                    "redacted_thinking": block.get("data").cloned().unwrap_or(Value::Null),
                })),
            )],
            "tool_use" | "server_tool_use" => {
                let tool_id = str_at(block, "/id").unwrap_or_default();
                let name = str_at(block, "/name").unwrap_or_default();
                let slot = ToolSlot {
                    id: if tool_id.is_empty() {
                        format!("{name}_{index}")
                    } else {
                        tool_id.to_string()
                    },
                    index,
                    name: name.to_string(),
                };
                ctx.register_tool(slot.clone());
                if block_type == "server_tool_use" {
                    Vec::new()
                } else {
                    vec![StreamChunk::new(
                        id,
                        ChunkData::ToolCalls(vec![ToolCallDelta {
                            index,
                            id: slot.id,
                            r#type: "function".into(),
                            name: Some(slot.name),
                            arguments: String::new(),
                        }]),
                    )]
                }
            }
            "web_search_tool_result" if !ctx.returned_citation => {
                let citations: Vec<Citation> = block
                    .get("content")
                    .and_then(Value::as_array)
                    .map(|results| {
                        results
                            .iter()
                            .filter_map(|r| {
                                let url = str_at(r, "/url").filter(|u| !u.is_empty())?;
                                let title = str_at(r, "/title").filter(|t| !t.is_empty()).unwrap_or(url);
                                Some(Citation {
                                    title: title.to_string(),
                                    url: url.to_string(),
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if citations.is_empty() {
                    Vec::new()
                } else {
                    ctx.returned_citation = true;
                    vec![StreamChunk::new(
                        id,
                        ChunkData::Grounding(Grounding {
                            citations,
                            search_queries: Vec::new(),
                        }),
                    )]
                }
            }
            _ => Vec::new(),
        };
        Ok(chunks)
    }

    fn block_delta(&self, raw: &Value, ctx: &mut StreamContext) -> Result<Vec<StreamChunk>, LlmError> {
        let index = block_index(raw)?;
        let delta = raw
            .get("delta")
            .ok_or_else(|| LlmError::StreamParseError("content_block_delta without delta".into()))?;
        let id = ctx.id.clone();
        let chunk = match str_at(delta, "/type") {
            Some("text_delta") => str_at(delta, "/text")
                .filter(|t| !t.is_empty())
                .map(|t| StreamChunk::text(id, t)),
            Some("thinking_delta") => str_at(delta, "/thinking")
                .filter(|t| !t.is_empty())
                .map(|t| StreamChunk::reasoning(id, t)),
            Some("signature_delta") => str_at(delta, "/signature").map(|sig| {
                StreamChunk::new(
                    id,
                    ChunkData::Data(serde_json::json!({"index": index, "signature": sig})),
                )
            }),
            Some("input_json_delta") => {
                let partial = str_at(delta, "/partial_json").unwrap_or_default();
                let slot = ctx.tool_at(index).cloned().ok_or_else(|| {
                    LlmError::StreamParseError(format!("input_json_delta for unknown block {index}"))
                })?;
                let is_server_tool = ctx
                    .block_types
                    .get(&index)
                    .is_some_and(|t| t == "server_tool_use");
                (!partial.is_empty() && !is_server_tool).then(|| {
                    StreamChunk::new(
                        id,
                        ChunkData::ToolCalls(vec![ToolCallDelta {
                            index,
                            id: slot.id,
                            r#type: "function".into(),
                            name: Some(slot.name),
                            arguments: partial.to_string(),
                        }]),
                    )
                })
            }
            Some(other) => {
                tracing::trace!(delta = other, "ignoring anthropic delta");
                None
            }
            None => {
                return Err(LlmError::StreamParseError(
                    "content_block_delta without delta type".into(),
                ));
            }
        };
        Ok(chunk.into_iter().collect())
    }
}

fn block_index(raw: &Value) -> Result<u32, LlmError> {
    raw.get("index")
        .and_then(Value::as_u64)
        .map(|i| i as u32)
        .ok_or_else(|| LlmError::StreamParseError("content block event without index".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn run(events: &[Value]) -> Vec<StreamChunk> {
        let t = AnthropicStreamTransformer::default();
        let mut ctx = StreamContext::new("s");
        events
            .iter()
            .flat_map(|e| t.transform(e, &mut ctx).unwrap())
            .collect()
    }

    #[test]
    fn tool_use_and_usage() {
        let out = run(&[
            json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 10, "output_tokens": 1}}}),
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {}}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"city\":"}}),
            json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "\"Paris\"}"}}),
            json!({"type": "content_block_stop", "index": 0}),
            json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 20}}),
            json!({"type": "message_stop"}),
        ]);
        assert!(out.iter().all(|c| c.id == "msg_1"));
        let args: String = out
            .iter()
            .filter_map(|c| match &c.data {
                ChunkData::ToolCalls(d) => Some(d[0].arguments.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(args, "{\"city\":\"Paris\"}");
        let usage = out.iter().find_map(|c| match &c.data {
            ChunkData::Usage(u) => Some(u.clone()),
            _ => None,
        });
        assert_eq!(usage.map(|u| (u.prompt_tokens, u.completion_tokens)), Some((10, 20)));
        assert_eq!(
            out.last().map(|c| c.data.clone()),
            Some(ChunkData::Stop(FinishReason::ToolCalls))
        );
    }

    #[test]
    fn error_event_maps_to_taxonomy() {
        let out = run(&[json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}})]);
        match &out[0].data {
            ChunkData::Error(e) => assert_eq!(e.kind, ErrorKind::RateLimited),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn json_delta_for_unknown_block_fails() {
        let t = AnthropicStreamTransformer::default();
        let mut ctx = StreamContext::new("s");
        let raw = json!({"type": "content_block_delta", "index": 3, "delta": {"type": "input_json_delta", "partial_json": "{}"}});
        assert!(t.transform(&raw, &mut ctx).is_err());
    }
}
