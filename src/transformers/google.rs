//! Google GenAI `GenerateContentResponse` chunks (Gemini API and Vertex AI).

use serde_json::Value;

use super::business_error::detect_embedded_error;
use super::{StreamTransformer, str_at};
use crate::error::LlmError;
use crate::streaming::{
    Base64Image, ChunkData, Citation, FinishReason, Grounding, StreamChunk, StreamContext,
    ToolCallDelta, ToolSlot,
};
use crate::types::Usage;

#[derive(Debug, Clone)]
pub struct GoogleStreamTransformer {
    provider: String,
}

impl GoogleStreamTransformer {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl Default for GoogleStreamTransformer {
    fn default() -> Self {
        Self::new("google")
    }
}

pub fn parse_usage(meta: &Value) -> Usage {
    let count = |key: &str| meta.get(key).and_then(Value::as_u64).map(|n| n as u32);
    let prompt = count("promptTokenCount").unwrap_or(0);
    let thoughts = count("thoughtsTokenCount");
    let completion = count("candidatesTokenCount").unwrap_or(0) + thoughts.unwrap_or(0);
    let mut usage = Usage::new(prompt, completion);
    usage.total_tokens = usage.total_tokens.max(count("totalTokenCount").unwrap_or(0));
    usage.cached_tokens = count("cachedContentTokenCount");
    usage.reasoning_tokens = thoughts;
    usage
}

impl StreamTransformer for GoogleStreamTransformer {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn transform(&self, raw: &Value, ctx: &mut StreamContext) -> Result<Vec<StreamChunk>, LlmError> {
        if let Some(error) = detect_embedded_error(&self.provider, raw) {
            return Ok(vec![StreamChunk::error(ctx.id.clone(), error)]);
        }
        ctx.adopt_id(str_at(raw, "/responseId"));
        if let Some(meta) = raw.get("usageMetadata") {
            ctx.usage = Some(parse_usage(meta));
        }

        let mut out = Vec::new();
        let candidate = raw.pointer("/candidates/0");

        if let Some(parts) = candidate
            .and_then(|c| c.pointer("/content/parts"))
            .and_then(Value::as_array)
        {
            for part in parts {
                self.push_part(part, ctx, &mut out)?;
            }
        }

        if !ctx.returned_citation
            && let Some(grounding) = candidate
                .and_then(|c| c.get("groundingMetadata"))
                .and_then(parse_grounding)
        {
            ctx.returned_citation = true;
            out.push(StreamChunk::new(ctx.id.clone(), ChunkData::Grounding(grounding)));
        }

        let finish = candidate
            .and_then(|c| str_at(c, "/finishReason"))
            .map(|reason| {
                let reason = FinishReason::from_provider(reason);
                if reason == FinishReason::Stop && !ctx.tools.is_empty() {
                    FinishReason::ToolCalls
                } else {
                    reason
                }
            })
            .or_else(|| {
                // Prompt blocked before any candidate was produced.
                str_at(raw, "/promptFeedback/blockReason").map(|_| FinishReason::ContentFilter)
            });

        if let Some(reason) = finish {
            if let Some(usage) = ctx.usage.take() {
                out.push(StreamChunk::new(ctx.id.clone(), ChunkData::Usage(usage)));
            }
            out.push(StreamChunk::stop(ctx.id.clone(), reason));
        }
        Ok(out)
    }
}

impl GoogleStreamTransformer {
    fn push_part(
        &self,
        part: &Value,
        ctx: &mut StreamContext,
        out: &mut Vec<StreamChunk>,
    ) -> Result<(), LlmError> {
        let id = ctx.id.clone();
        if let Some(text) = str_at(part, "/text").filter(|t| !t.is_empty()) {
            let thought = part.get("thought").and_then(Value::as_bool).unwrap_or(false);
            out.push(if thought {
                StreamChunk::reasoning(id.clone(), text)
            } else {
                StreamChunk::text(id.clone(), text)
            });
        }
        if let Some(call) = part.get("functionCall") {
            let name = str_at(call, "/name").ok_or_else(|| {
                LlmError::StreamParseError(format!("functionCall without name: {call}"))
            })?;
            let index = ctx.tools.len() as u32;
            let slot = ToolSlot {
                id: str_at(call, "/id")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{name}_{index}")),
                index,
                name: name.to_string(),
            };
            ctx.register_tool(slot.clone());
            let arguments = call
                .get("args")
                .map(Value::to_string)
                .unwrap_or_else(|| "{}".to_string());
            out.push(StreamChunk::new(
                id.clone(),
                ChunkData::ToolCalls(vec![ToolCallDelta {
                    index,
                    id: slot.id,
                    r#type: "function".into(),
                    name: Some(slot.name),
                    arguments,
                }]),
            ));
        }
        if let Some(inline) = part.get("inlineData")
            && let (Some(mime), Some(data)) = (str_at(inline, "/mimeType"), str_at(inline, "/data"))
            && mime.starts_with("image/")
        {
            out.push(StreamChunk::new(
                id.clone(),
                ChunkData::Base64Image(Base64Image::from_parts(mime, data)),
            ));
        }
        if let Some(signature) = str_at(part, "/thoughtSignature") {
            out.push(StreamChunk::new(
                id,
                ChunkData::Data(serde_json::json!({"thought_signature": signature})),
            ));
        }
        Ok(())
    }
}

fn parse_grounding(meta: &Value) -> Option<Grounding> {
    let citations: Vec<Citation> = meta
        .get("groundingChunks")
        .and_then(Value::as_array)
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|c| {
                    let web = c.get("web")?;
                    let url = str_at(web, "/uri").filter(|u| !u.is_empty())?;
                    let title = str_at(web, "/title").filter(|t| !t.is_empty()).unwrap_or(url);
                    Some(Citation {
                        title: title.to_string(),
                        url: url.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    if citations.is_empty() {
        return None;
    }
    let search_queries = meta
        .get("webSearchQueries")
        .and_then(Value::as_array)
        .map(|q| q.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    Some(Grounding {
        citations,
        search_queries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(chunks: &[Value]) -> Vec<StreamChunk> {
        let t = GoogleStreamTransformer::default();
        let mut ctx = StreamContext::new("s");
        chunks
            .iter()
            .flat_map(|c| t.transform(c, &mut ctx).unwrap())
            .collect()
    }

    #[test]
    fn thoughts_text_and_finish() {
        let out = run(&[
            json!({"responseId": "r1", "candidates": [{"content": {"parts": [{"text": "plan", "thought": true}]}}]}),
            json!({"candidates": [{"content": {"parts": [{"text": "Hi"}]}, "finishReason": "STOP"}],
                   "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6}}),
        ]);
        let data: Vec<_> = out.iter().map(|c| c.data.clone()).collect();
        assert_eq!(data[0], ChunkData::Reasoning("plan".into()));
        assert_eq!(data[1], ChunkData::Text("Hi".into()));
        assert!(matches!(&data[2], ChunkData::Usage(u) if u.total_tokens == 6));
        assert_eq!(data[3], ChunkData::Stop(FinishReason::Stop));
        assert!(out.iter().all(|c| c.id == "r1"));
    }

    #[tokio::test]
    async fn usage_survives_a_stream_without_finish_reason() {
        use crate::streaming::normalize_values;
        use futures::StreamExt;
        use std::sync::Arc;

        let chunks: Vec<_> = normalize_values(
            vec![json!({
                "candidates": [{"content": {"parts": [{"text": "cut short"}]}}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
            })],
            Arc::new(GoogleStreamTransformer::default()),
            StreamContext::new("s"),
        )
        .collect()
        .await;
        assert_eq!(chunks[0].data, ChunkData::Text("cut short".into()));
        assert!(matches!(&chunks[1].data, ChunkData::Usage(u) if u.total_tokens == 5));
        assert_eq!(chunks[2].data, ChunkData::Stop(FinishReason::Stop));
    }

    #[test]
    fn function_calls_get_ids_and_tool_finish() {
        let out = run(&[json!({"candidates": [{
            "content": {"parts": [{"functionCall": {"name": "lookup", "args": {"q": "x"}}}]},
            "finishReason": "STOP"
        }]})]);
        match &out[0].data {
            ChunkData::ToolCalls(d) => {
                assert_eq!(d[0].id, "lookup_0");
                assert_eq!(d[0].arguments, "{\"q\":\"x\"}");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
        assert_eq!(
            out.last().map(|c| c.data.clone()),
            Some(ChunkData::Stop(FinishReason::ToolCalls))
        );
    }

    #[test]
    fn inline_images_and_grounding_once() {
        let chunk = json!({"candidates": [{
            "content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "AAAA"}}]},
            "groundingMetadata": {
                "groundingChunks": [{"web": {"uri": "https://a.example", "title": "A"}}, {"web": {"title": "no uri"}}],
                "webSearchQueries": ["rust"]
            }
        }]});
        let out = run(&[chunk.clone(), chunk]);
        let groundings: Vec<_> = out
            .iter()
            .filter_map(|c| match &c.data {
                ChunkData::Grounding(g) => Some(g.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(groundings.len(), 1);
        assert_eq!(groundings[0].citations.len(), 1);
        assert_eq!(groundings[0].search_queries, vec!["rust".to_string()]);
        assert_eq!(
            out[0].data,
            ChunkData::Base64Image(Base64Image {
                url: "data:image/png;base64,AAAA".into()
            })
        );
    }
}
