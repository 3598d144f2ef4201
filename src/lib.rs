//! model-runtime
//!
//! A unified LLM provider runtime. One call surface (`chat`, `embeddings`,
//! `create_image`, `generate_object`, `text_to_speech`, `models`) reaches many
//! heterogeneous upstream providers through:
//!
//! - a router/dispatcher ([`router::UniformRuntime`]) that picks a provider
//!   configuration per request and falls back through an ordered option list;
//! - a stream protocol normalizer ([`transformers`]) that turns every
//!   provider's incremental wire format into one canonical chunk stream
//!   ([`streaming::StreamChunk`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use model_runtime::prelude::*;
//! use futures::StreamExt;
//!
//! let runtime = UniformRuntime::builder()
//!     .router(RouterEntry::new(ApiType::OpenAi).option(RouterOption::new().api_key("sk-...")))
//!     .build()?;
//!
//! let mut stream = runtime
//!     .chat(ChatRequest::new("gpt-4o-mini", vec![ChatMessage::user("Hello")]), RequestOptions::default())
//!     .await?;
//! while let Some(chunk) = stream.next().await {
//!     println!("{chunk:?}");
//! }
//! ```
#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod observability;
pub mod providers;
pub mod retry;
pub mod router;
pub mod streaming;
pub mod transformers;
pub mod types;

pub use error::LlmError;

/// Commonly used types.
pub mod prelude {
    pub use crate::config::{ProviderSettings, RuntimeConfig};
    pub use crate::error::{ErrorKind, LlmError};
    pub use crate::providers::{ApiType, ProviderAdapter};
    pub use crate::router::{
        RequestOptions, RouteAttemptResult, RouterEntry, RouterOption, UniformRuntime,
    };
    pub use crate::streaming::{
        CancelHandle, ChunkData, ChunkStream, FinishReason, StreamCallbacks, StreamChunk,
    };
    pub use crate::types::{
        ChatMessage, ChatRequest, ContentPart, EmbeddingRequest, ImageRequest, MessageRole,
        ObjectRequest, SpeechRequest, Tool,
    };
}
