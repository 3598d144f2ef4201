//! Stream protocol normalizer
//!
//! One transformer per wire-format family converts raw provider chunks into
//! canonical [`StreamChunk`]s. Transformers are pure apart from the
//! [`StreamContext`] they are handed.
//!
//! Shared building blocks:
//! - `business_error`: errors embedded in otherwise-200 bodies
//! - `rules`: ordered extraction rules (reasoning fields, citation shapes)
//! - `think`: inline `<think>` span splitting
//! - `images`: markdown base64 image extraction

pub mod business_error;
pub mod images;
pub mod rules;
pub mod think;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "openai")]
pub mod openai;

use crate::error::LlmError;
use crate::streaming::{ChunkError, StreamChunk, StreamContext};

/// Raw provider chunk → canonical chunks.
pub trait StreamTransformer: Send + Sync {
    /// Provider id used in error payloads and logs.
    fn provider(&self) -> &str;

    fn transform(
        &self,
        raw: &serde_json::Value,
        ctx: &mut StreamContext,
    ) -> Result<Vec<StreamChunk>, LlmError>;
}

/// Run a transformer, turning any failure into a single in-band `error`
/// chunk that carries the offending raw chunk.
pub fn transform_guarded<T>(
    transformer: &T,
    raw: &serde_json::Value,
    ctx: &mut StreamContext,
) -> Vec<StreamChunk>
where
    T: StreamTransformer + ?Sized,
{
    match transformer.transform(raw, ctx) {
        Ok(chunks) => chunks,
        Err(error) => {
            tracing::warn!(
                provider = transformer.provider(),
                error = %error,
                raw = %raw,
                "stream transformer failed"
            );
            let payload = ChunkError::from_error(&error, Some(transformer.provider()))
                .with_raw(raw.clone());
            vec![StreamChunk::error(ctx.id.clone(), payload)]
        }
    }
}

/// Extract a JSON string field.
pub(crate) fn str_at<'a>(value: &'a serde_json::Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(|v| v.as_str())
}
