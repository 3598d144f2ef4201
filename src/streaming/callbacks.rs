//! Callback dispatch stage.
//!
//! Observes a canonical chunk stream, forwards each chunk to the matching
//! [`StreamCallbacks`] hook and aggregates a [`Completion`]. `on_completion`
//! and `on_final` fire exactly once when the stream ends, whether it ends
//! with `stop`, `error`, or is simply exhausted.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

use super::chunk::{
    Base64Image, ChunkData, ChunkError, ChunkStream, FinishReason, Grounding, SpeedMetrics,
    StreamChunk, ToolCallDelta,
};
use super::tool_calls::ToolCallAccumulator;
use crate::types::{ToolCall, Usage};

/// Aggregated result of one stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub id: String,
    pub text: String,
    pub thinking: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub grounding: Option<Grounding>,
    pub images: Vec<Base64Image>,
    pub finish_reason: Option<FinishReason>,
    pub speed: Option<SpeedMetrics>,
    pub error: Option<ChunkError>,
}

impl Completion {
    pub fn is_cancelled(&self) -> bool {
        self.finish_reason == Some(FinishReason::Cancelled)
    }
}

/// Caller hooks. Every method defaults to a no-op.
#[async_trait]
pub trait StreamCallbacks: Send + Sync {
    async fn on_start(&self) {}

    async fn on_text(&self, _delta: &str, _accumulated: &str) {}

    async fn on_thinking(&self, _delta: &str, _accumulated: &str) {}

    /// `deltas` are the fragments of this chunk; `calls` the calls
    /// accumulated so far.
    async fn on_tools_calling(&self, _deltas: &[ToolCallDelta], _calls: &[ToolCall]) {}

    async fn on_usage(&self, _usage: &Usage) {}

    async fn on_grounding(&self, _grounding: &Grounding) {}

    async fn on_base64_image(&self, _image: &Base64Image) {}

    /// Every chunk, after the type-specific hook.
    async fn on_content_part(&self, _chunk: &StreamChunk) {}

    async fn on_completion(&self, _completion: &Completion) {}

    async fn on_final(&self, _completion: &Completion) {}
}

/// Wrap `stream` so that `callbacks` observe every chunk.
pub fn with_callbacks(stream: ChunkStream, callbacks: Arc<dyn StreamCallbacks>) -> ChunkStream {
    let mut inner = stream;
    let s = async_stream::stream! {
        callbacks.on_start().await;
        let mut completion = Completion::default();
        let mut tools = ToolCallAccumulator::new();
        while let Some(chunk) = inner.next().await {
            if completion.id.is_empty() {
                completion.id = chunk.id.clone();
            }
            match &chunk.data {
                ChunkData::Text(delta) => {
                    completion.text.push_str(delta);
                    callbacks.on_text(delta, &completion.text).await;
                }
                ChunkData::Reasoning(delta) => {
                    completion.thinking.push_str(delta);
                    callbacks.on_thinking(delta, &completion.thinking).await;
                }
                ChunkData::ToolCalls(deltas) => {
                    tools.extend(deltas);
                    completion.tool_calls = tools.calls();
                    callbacks.on_tools_calling(deltas, &completion.tool_calls).await;
                }
                ChunkData::Usage(usage) => {
                    match completion.usage.as_mut() {
                        Some(previous) => previous.merge(usage),
                        None => completion.usage = Some(usage.clone()),
                    }
                    callbacks.on_usage(usage).await;
                }
                ChunkData::Grounding(grounding) => {
                    completion.grounding = Some(grounding.clone());
                    callbacks.on_grounding(grounding).await;
                }
                ChunkData::Base64Image(image) => {
                    completion.images.push(image.clone());
                    callbacks.on_base64_image(image).await;
                }
                ChunkData::Stop(reason) => completion.finish_reason = Some(reason.clone()),
                ChunkData::Error(error) => completion.error = Some(error.clone()),
                ChunkData::Speed(speed) => completion.speed = Some(*speed),
                ChunkData::Data(_) => {}
            }
            callbacks.on_content_part(&chunk).await;
            yield chunk;
        }
        callbacks.on_completion(&completion).await;
        callbacks.on_final(&completion).await;
    };
    Box::pin(s)
}
