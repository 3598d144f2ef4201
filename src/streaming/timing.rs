//! Token-speed and pricing stage.
//!
//! Prices every `usage` chunk when model pricing is known and follows it with
//! a `speed` chunk (time to first token, tokens per second, latency).

use futures::StreamExt;
use tokio::time::Instant;

use super::chunk::{ChunkData, ChunkStream, SpeedMetrics, StreamChunk};
use crate::types::ModelPricing;

pub fn with_timing(
    stream: ChunkStream,
    started_at: Instant,
    pricing: Option<ModelPricing>,
) -> ChunkStream {
    let mut inner = stream;
    let s = async_stream::stream! {
        let mut first_token_at: Option<Instant> = None;
        while let Some(mut chunk) = inner.next().await {
            if first_token_at.is_none() && chunk.is_content() {
                first_token_at = Some(Instant::now());
            }
            let ChunkData::Usage(usage) = &mut chunk.data else {
                yield chunk;
                continue;
            };
            if let Some(pricing) = &pricing {
                usage.cost = Some(pricing.cost(usage));
            }
            let speed = speed_metrics(started_at, first_token_at, usage.completion_tokens);
            let id = chunk.id.clone();
            yield chunk;
            yield StreamChunk::new(id, ChunkData::Speed(speed));
        }
    };
    Box::pin(s)
}

fn speed_metrics(
    started_at: Instant,
    first_token_at: Option<Instant>,
    output_tokens: u32,
) -> SpeedMetrics {
    let now = Instant::now();
    let first = first_token_at.unwrap_or(now);
    let generation = now.duration_since(first).as_secs_f64();
    let tps = if generation > 0.0 {
        output_tokens as f64 / generation
    } else {
        0.0
    };
    SpeedMetrics {
        ttft_ms: first.duration_since(started_at).as_millis() as u64,
        tps,
        latency_ms: now.duration_since(started_at).as_millis() as u64,
    }
}
