//! Generic stream pipeline
//!
//! Provider-agnostic stages composed around a [`StreamTransformer`]:
//!
//! 1. decode raw events (SSE bytes or replayed JSON values)
//! 2. guarded transform into canonical chunks
//! 3. first-chunk error detection (turns an in-band error on the very first
//!    chunk into an `Err`, so the router can fall back)
//! 4. timing and pricing
//! 5. cancellation
//! 6. callback dispatch

use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::time::Instant;

use super::callbacks::{StreamCallbacks, with_callbacks};
use super::cancel::{CancelHandle, make_cancellable, run_cancellable};
use super::chunk::{ChunkData, ChunkError, ChunkStream, FinishReason, StreamChunk};
use super::context::StreamContext;
use super::sse::{RawEvent, decode_sse};
use super::timing::with_timing;
use crate::error::{ErrorKind, LlmError};
use crate::transformers::{StreamTransformer, transform_guarded};
use crate::types::ModelPricing;

/// Per-request pipeline options.
#[derive(Clone, Default)]
pub struct PipelineOptions {
    pub callbacks: Option<Arc<dyn StreamCallbacks>>,
    pub signal: Option<CancelHandle>,
    pub pricing: Option<ModelPricing>,
}

impl std::fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("callbacks", &self.callbacks.is_some())
            .field("signal", &self.signal)
            .field("pricing", &self.pricing)
            .finish()
    }
}

/// Normalize decoded raw events into canonical chunks.
///
/// The stream always ends with exactly one `stop` or `error` chunk: a
/// `stop` is held back until the provider closes the body and synthesized
/// when the provider never sent one.
pub fn normalize_events<S>(
    events: S,
    transformer: Arc<dyn StreamTransformer>,
    ctx: StreamContext,
) -> ChunkStream
where
    S: Stream<Item = RawEvent> + Send + 'static,
{
    let mut ctx = ctx;
    let s = async_stream::stream! {
        let mut events = Box::pin(events);
        let mut pending_stop: Option<StreamChunk> = None;
        while let Some(event) = events.next().await {
            let chunks = match event {
                RawEvent::Json(raw) => transform_guarded(transformer.as_ref(), &raw, &mut ctx),
                RawEvent::Invalid { data, reason } => {
                    let error = ChunkError {
                        kind: ErrorKind::StreamParseError,
                        message: format!("Invalid chunk: {reason}"),
                        provider: Some(transformer.provider().to_string()),
                        raw: Some(serde_json::Value::String(data)),
                    };
                    vec![StreamChunk::error(ctx.id.clone(), error)]
                }
                RawEvent::TransportError(message) => {
                    let error = ChunkError {
                        kind: ErrorKind::Network,
                        message,
                        provider: Some(transformer.provider().to_string()),
                        raw: None,
                    };
                    vec![StreamChunk::error(ctx.id.clone(), error)]
                }
            };
            for chunk in chunks {
                match chunk.data {
                    // Trailing usage frames may follow the finish frame; keep
                    // `stop` last.
                    ChunkData::Stop(_) => {
                        if pending_stop.is_none() {
                            pending_stop = Some(chunk);
                        }
                    }
                    ChunkData::Error(_) => {
                        yield chunk;
                        // Nothing parsed after a fatal in-band error is trustworthy.
                        return;
                    }
                    _ => yield chunk,
                }
            }
        }
        // Usage a transformer was still holding when the body closed.
        if let Some(usage) = ctx.usage.take() {
            yield StreamChunk::new(ctx.id.clone(), ChunkData::Usage(usage));
        }
        yield pending_stop.unwrap_or_else(|| StreamChunk::stop(ctx.id.clone(), FinishReason::Stop));
    };
    Box::pin(s)
}

/// Normalize a provider SSE response body.
pub fn normalize_sse_response(
    response: reqwest::Response,
    transformer: Arc<dyn StreamTransformer>,
    ctx: StreamContext,
) -> ChunkStream {
    normalize_events(decode_sse(response.bytes_stream()), transformer, ctx)
}

/// Normalize already-parsed JSON values (non-streaming responses replayed as
/// events).
pub fn normalize_values(
    values: Vec<serde_json::Value>,
    transformer: Arc<dyn StreamTransformer>,
    ctx: StreamContext,
) -> ChunkStream {
    let events = futures::stream::iter(values.into_iter().map(RawEvent::Json));
    normalize_events(events, transformer, ctx)
}

/// Apply first-chunk error detection and the remaining stages.
pub async fn finish_stream(
    stream: ChunkStream,
    options: PipelineOptions,
    started_at: Instant,
) -> Result<ChunkStream, LlmError> {
    let mut stream = stream;
    let first = run_cancellable(options.signal.as_ref(), async { Ok(stream.next().await) }).await?;

    let stream: ChunkStream = match first {
        Some(StreamChunk {
            data: ChunkData::Error(error),
            ..
        }) => {
            tracing::debug!(kind = %error.kind, message = %error.message, "first chunk is an error");
            return Err(error.into_error());
        }
        Some(chunk) => Box::pin(futures::stream::iter(std::iter::once(chunk)).chain(stream)),
        None => stream,
    };

    let mut stream = with_timing(stream, started_at, options.pricing);
    if let Some(signal) = options.signal {
        stream = make_cancellable(stream, signal);
    }
    if let Some(callbacks) = options.callbacks {
        stream = with_callbacks(stream, callbacks);
    }
    Ok(stream)
}
