//! OpenAI-style chat-completion chunks
//!
//! Handles `chat.completion.chunk` deltas as well as a whole
//! `chat.completion` (its `message` is read like a delta), so non-streaming
//! responses go through the same code path.

use serde::Deserialize;
use serde_json::Value;

use super::business_error::detect_embedded_error;
use super::images::extract_markdown_images;
use super::rules::{extract_citations, extract_reasoning};
use super::think::{Segment, split_think};
use super::{StreamTransformer, str_at};
use crate::error::LlmError;
use crate::streaming::{
    ChunkData, FinishReason, Grounding, StreamChunk, StreamContext, ToolCallDelta, ToolSlot,
};
use crate::types::Usage;

#[derive(Debug, Clone)]
pub struct OpenAiStreamTransformer {
    provider: String,
}

impl OpenAiStreamTransformer {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl Default for OpenAiStreamTransformer {
    fn default() -> Self {
        Self::new("openai")
    }
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionTokensDetails {
    reasoning_tokens: Option<u32>,
}

/// Parse an OpenAI `usage` object.
pub fn parse_usage(value: &Value) -> Option<Usage> {
    if !value.is_object() {
        return None;
    }
    let raw: OpenAiUsage = serde_json::from_value(value.clone()).ok()?;
    let mut usage = Usage::new(raw.prompt_tokens, raw.completion_tokens);
    usage.total_tokens = usage.total_tokens.max(raw.total_tokens);
    usage.cached_tokens = raw.prompt_tokens_details.and_then(|d| d.cached_tokens);
    usage.reasoning_tokens = raw.completion_tokens_details.and_then(|d| d.reasoning_tokens);
    Some(usage)
}

impl StreamTransformer for OpenAiStreamTransformer {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn transform(&self, raw: &Value, ctx: &mut StreamContext) -> Result<Vec<StreamChunk>, LlmError> {
        if let Some(error) = detect_embedded_error(&self.provider, raw) {
            return Ok(vec![StreamChunk::error(ctx.id.clone(), error)]);
        }
        ctx.adopt_id(str_at(raw, "/id"));

        let mut out = Vec::new();
        if !ctx.returned_citation
            && let Some(citations) = extract_citations(raw)
        {
            ctx.returned_citation = true;
            out.push(StreamChunk::new(
                ctx.id.clone(),
                ChunkData::Grounding(Grounding {
                    citations,
                    search_queries: Vec::new(),
                }),
            ));
        }

        let choice = raw.pointer("/choices/0");
        let delta = choice.and_then(|c| c.get("delta").or_else(|| c.get("message")));

        if let Some(delta) = delta {
            if let Some(reasoning) = extract_reasoning(delta) {
                out.push(StreamChunk::reasoning(ctx.id.clone(), reasoning));
            }
            if let Some(content) = delta.get("content").and_then(Value::as_str) {
                push_content(content, ctx, &mut out);
            }
            if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array)
                && !calls.is_empty()
            {
                let deltas = calls
                    .iter()
                    .enumerate()
                    .map(|(position, call)| tool_call_delta(position, call, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(StreamChunk::new(ctx.id.clone(), ChunkData::ToolCalls(deltas)));
            }
        }

        // Some gateways repeat cumulative usage on every delta; only the
        // latest is kept and it goes out on the finish or a usage-only frame.
        if let Some(usage) = raw.get("usage").and_then(parse_usage) {
            ctx.usage = Some(usage);
        }
        let finish = choice.and_then(|c| str_at(c, "/finish_reason"));
        if (finish.is_some() || out.is_empty())
            && let Some(usage) = ctx.usage.take()
        {
            out.push(StreamChunk::new(ctx.id.clone(), ChunkData::Usage(usage)));
        }

        if let Some(reason) = finish {
            out.push(StreamChunk::stop(
                ctx.id.clone(),
                FinishReason::from_provider(reason),
            ));
        }
        Ok(out)
    }
}

/// Text content: inline think spans, then markdown images.
fn push_content(content: &str, ctx: &mut StreamContext, out: &mut Vec<StreamChunk>) {
    if content.is_empty() {
        return;
    }
    for segment in split_think(content, ctx) {
        match segment {
            Segment::Reasoning(text) => out.push(StreamChunk::reasoning(ctx.id.clone(), text)),
            Segment::Text(text) => {
                let (cleaned, images) = extract_markdown_images(&text);
                if !cleaned.is_empty() {
                    out.push(StreamChunk::text(ctx.id.clone(), cleaned));
                }
                out.extend(
                    images
                        .into_iter()
                        .map(|image| StreamChunk::new(ctx.id.clone(), ChunkData::Base64Image(image))),
                );
            }
        }
    }
}

/// Resolve `(id, index, name)` for one tool-call fragment.
///
/// Later fragments often omit id and name; they inherit what was first seen
/// for their index. Calls that never carry an id get `"{name}_{index}"`.
fn tool_call_delta(
    position: usize,
    call: &Value,
    ctx: &mut StreamContext,
) -> Result<ToolCallDelta, LlmError> {
    let function = match call.get("function") {
        Some(f) if f.is_object() => f,
        _ => {
            return Err(LlmError::StreamParseError(format!(
                "tool call without function payload: {call}"
            )));
        }
    };
    let explicit_index = call.get("index").and_then(Value::as_u64).map(|i| i as u32);
    let index = explicit_index.unwrap_or(position as u32);
    let id = str_at(call, "/id").filter(|s| !s.is_empty());
    let name = str_at(function, "/name").filter(|s| !s.is_empty());
    let arguments = match function.get("arguments") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let known = ctx.tool_at(index).cloned();
    let slot = match (id, known) {
        (Some(id), Some(known)) if known.id == id => known,
        (Some(id), known) => ToolSlot {
            id: id.to_string(),
            index,
            name: name
                .map(str::to_string)
                .or_else(|| known.map(|k| k.name))
                .unwrap_or_default(),
        },
        (None, Some(known)) => known,
        (None, None) => match (name, &ctx.tool) {
            (Some(name), _) => ToolSlot {
                id: format!("{name}_{index}"),
                index,
                name: name.to_string(),
            },
            // Single-call streams may drop the index entirely.
            (None, Some(current)) if explicit_index.is_none() => current.clone(),
            (None, _) => {
                return Err(LlmError::StreamParseError(format!(
                    "tool call fragment for unknown index {index}"
                )));
            }
        },
    };
    ctx.register_tool(slot.clone());

    Ok(ToolCallDelta {
        index: slot.index,
        id: slot.id,
        r#type: "function".to_string(),
        name: Some(slot.name).filter(|n| !n.is_empty()),
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::streaming::ToolCallAccumulator;
    use serde_json::json;

    fn run(chunks: &[Value]) -> Vec<StreamChunk> {
        let t = OpenAiStreamTransformer::default();
        let mut ctx = StreamContext::new("s");
        chunks
            .iter()
            .flat_map(|c| t.transform(c, &mut ctx).unwrap())
            .collect()
    }

    #[test]
    fn think_tags_split_into_reasoning_and_text() {
        let out = run(&[json!({"choices": [{"delta": {"content": "before<think>mid</think>after"}}]})]);
        let kinds: Vec<_> = out.iter().map(|c| c.data.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                ChunkData::Text("before".into()),
                ChunkData::Reasoning("mid".into()),
                ChunkData::Text("after".into()),
            ]
        );
    }

    #[test]
    fn fragments_inherit_id_and_name_by_index() {
        let out = run(&[
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "function": {"name": "f", "arguments": ""}},
                {"index": 1, "id": "call_b", "function": {"name": "g", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 1, "function": {"arguments": "{}"}},
                {"index": 0, "function": {"arguments": "{\"x\":"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "1}"}}
            ]}}]}),
        ]);
        let mut acc = ToolCallAccumulator::new();
        for chunk in &out {
            if let ChunkData::ToolCalls(deltas) = &chunk.data {
                acc.extend(deltas);
            }
        }
        let calls = acc.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.name, "f");
        assert_eq!(calls[0].function.arguments, "{\"x\":1}");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].function.arguments, "{}");
    }

    #[test]
    fn missing_ids_get_synthetic_id() {
        let out = run(&[
            json!({"choices": [{"delta": {"tool_calls": [
                {"function": {"name": "lookup", "arguments": "{\"q\":"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"function": {"arguments": "\"rust\"}"}}
            ]}}]}),
        ]);
        let mut ids = out.iter().filter_map(|c| match &c.data {
            ChunkData::ToolCalls(d) => Some(d[0].id.clone()),
            _ => None,
        });
        assert_eq!(ids.next().as_deref(), Some("lookup_0"));
        assert_eq!(ids.next().as_deref(), Some("lookup_0"));
    }

    #[test]
    fn null_function_payload_is_a_parse_error() {
        let t = OpenAiStreamTransformer::default();
        let mut ctx = StreamContext::new("s");
        let raw = json!({"choices": [{"delta": {"tool_calls": [{"index": 0, "function": null}]}}]});
        let err = t.transform(&raw, &mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamParseError);
    }

    #[test]
    fn citations_emitted_once() {
        let chunk = json!({
            "choices": [{"delta": {"content": "x"}}],
            "citations": ["https://a.example", "https://b.example"]
        });
        let out = run(&[chunk.clone(), chunk.clone(), chunk]);
        let groundings = out
            .iter()
            .filter(|c| matches!(c.data, ChunkData::Grounding(_)))
            .count();
        assert_eq!(groundings, 1);
        assert!(matches!(out[0].data, ChunkData::Grounding(_)));
    }

    #[test]
    fn content_precedes_stop_and_usage_only_chunk() {
        let out = run(&[
            json!({"id": "chatcmpl-1", "choices": [{"delta": {"content": "tail"}, "finish_reason": "stop"}]}),
            json!({"id": "chatcmpl-1", "choices": [], "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}}),
        ]);
        assert_eq!(out[0].data, ChunkData::Text("tail".into()));
        assert_eq!(out[0].id, "chatcmpl-1");
        assert_eq!(out[1].data, ChunkData::Stop(FinishReason::Stop));
        match &out[2].data {
            ChunkData::Usage(u) => assert_eq!(u.total_tokens, 12),
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[test]
    fn cumulative_usage_on_deltas_is_emitted_once() {
        let usage = |n: u32| json!({"prompt_tokens": 5, "completion_tokens": n, "total_tokens": 5 + n});
        let out = run(&[
            json!({"choices": [{"delta": {"content": "a"}}], "usage": usage(1)}),
            json!({"choices": [{"delta": {"content": "b"}}], "usage": usage(2)}),
            json!({"choices": [{"delta": {}, "finish_reason": "stop"}], "usage": usage(3)}),
        ]);
        let usages: Vec<_> = out
            .iter()
            .filter_map(|c| match &c.data {
                ChunkData::Usage(u) => Some(u.completion_tokens),
                _ => None,
            })
            .collect();
        assert_eq!(usages, vec![3]);
        assert_eq!(out.last().unwrap().data, ChunkData::Stop(FinishReason::Stop));
    }

    #[test]
    fn completion_message_is_read_like_a_delta() {
        let out = run(&[json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "choices": [{
                "message": {"role": "assistant", "content": "done", "reasoning_content": "hmm"},
                "finish_reason": "stop"
            }]
        })]);
        assert_eq!(out[0].data, ChunkData::Reasoning("hmm".into()));
        assert_eq!(out[1].data, ChunkData::Text("done".into()));
    }
}
