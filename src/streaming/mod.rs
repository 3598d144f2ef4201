//! Streaming
//!
//! Canonical chunk model plus the provider-agnostic pipeline stages that wrap
//! every provider stream.

pub mod callbacks;
pub mod cancel;
pub mod chunk;
pub mod context;
pub mod pipeline;
pub mod sse;
pub mod timing;
pub mod tool_calls;

pub use callbacks::{Completion, StreamCallbacks, with_callbacks};
pub use cancel::{CancelHandle, make_cancellable, run_cancellable};
pub use chunk::{
    Base64Image, ChunkData, ChunkError, ChunkStream, Citation, FinishReason, Grounding,
    SpeedMetrics, StreamChunk, ToolCallDelta,
};
pub use context::{StreamContext, ToolSlot};
pub use pipeline::{
    PipelineOptions, finish_stream, normalize_events, normalize_sse_response, normalize_values,
};
pub use sse::{RawEvent, decode_sse, encode_chunk, encode_stream};
pub use timing::with_timing;
pub use tool_calls::ToolCallAccumulator;
