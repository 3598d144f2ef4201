//! Provider adapters
//!
//! An adapter turns one capability call (`chat`, `embeddings`, ...) into the
//! HTTP calls of one upstream protocol family and hands streamed bodies to
//! the matching [`StreamTransformer`](crate::transformers::StreamTransformer).
//! Adapters are cheap to construct: the router builds one per attempt through
//! an [`AdapterFactory`].

pub mod factory;
pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "github-copilot")]
pub mod github_copilot;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "openai")]
pub mod openai_compatible;

pub use factory::{AdapterFactory, Credentials, DefaultAdapterFactory};
pub use http::ProviderClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::LlmError;
use crate::streaming::{ChunkStream, PipelineOptions};
use crate::types::{
    ChatRequest, EmbeddingRequest, EmbeddingResponse, ImageRequest, ImageResponse, ModelInfo,
    ObjectRequest, ObjectResponse, SpeechRequest, SpeechResponse,
};

/// Upstream protocol / vendor selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiType {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai-compatible", alias = "openai_compatible")]
    OpenAiCompatible,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "google", alias = "gemini")]
    Google,
    #[serde(rename = "vertexai", alias = "vertex")]
    VertexAi,
    #[serde(rename = "github-copilot", alias = "copilot")]
    GithubCopilot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "xai")]
    Xai,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "minimax")]
    MiniMax,
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "together")]
    Together,
}

/// Wire protocol an [`ApiType`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFamily {
    OpenAiCompatible,
    Anthropic,
    Google,
    GithubCopilot,
}

impl ApiType {
    pub const ALL: [ApiType; 13] = [
        Self::OpenAi,
        Self::OpenAiCompatible,
        Self::Anthropic,
        Self::Google,
        Self::VertexAi,
        Self::GithubCopilot,
        Self::DeepSeek,
        Self::Groq,
        Self::Xai,
        Self::OpenRouter,
        Self::MiniMax,
        Self::Ollama,
        Self::Together,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenAiCompatible => "openai-compatible",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::VertexAi => "vertexai",
            Self::GithubCopilot => "github-copilot",
            Self::DeepSeek => "deepseek",
            Self::Groq => "groq",
            Self::Xai => "xai",
            Self::OpenRouter => "openrouter",
            Self::MiniMax => "minimax",
            Self::Ollama => "ollama",
            Self::Together => "together",
        }
    }

    pub const fn family(&self) -> ProviderFamily {
        match self {
            Self::Anthropic => ProviderFamily::Anthropic,
            Self::Google | Self::VertexAi => ProviderFamily::Google,
            Self::GithubCopilot => ProviderFamily::GithubCopilot,
            _ => ProviderFamily::OpenAiCompatible,
        }
    }

    /// Base URL used when no layer sets one. Vertex AI's URL depends on the
    /// location and is assembled by the adapter.
    pub const fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::OpenAiCompatible | Self::VertexAi => None,
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::GithubCopilot => Some("https://api.githubcopilot.com"),
            Self::DeepSeek => Some("https://api.deepseek.com/v1"),
            Self::Groq => Some("https://api.groq.com/openai/v1"),
            Self::Xai => Some("https://api.x.ai/v1"),
            Self::OpenRouter => Some("https://openrouter.ai/api/v1"),
            Self::MiniMax => Some("https://api.minimaxi.com/v1"),
            Self::Ollama => Some("http://localhost:11434/v1"),
            Self::Together => Some("https://api.together.xyz/v1"),
        }
    }

    /// Environment variables consulted, in order, for the default key.
    pub const fn env_keys(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::OpenAiCompatible | Self::Ollama => &[],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Google => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            Self::VertexAi => &["GOOGLE_VERTEX_CREDENTIALS"],
            Self::GithubCopilot => &["GITHUB_TOKEN"],
            Self::DeepSeek => &["DEEPSEEK_API_KEY"],
            Self::Groq => &["GROQ_API_KEY"],
            Self::Xai => &["XAI_API_KEY"],
            Self::OpenRouter => &["OPENROUTER_API_KEY"],
            Self::MiniMax => &["MINIMAX_API_KEY"],
            Self::Together => &["TOGETHER_API_KEY"],
        }
    }
}

impl std::fmt::Display for ApiType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiType {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| LlmError::ConfigurationError(format!("Unknown api type: {s}")))
    }
}

/// Per-call options handed to an adapter by the router.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub pipeline: PipelineOptions,
    /// Extra headers for this call only
    pub headers: BTreeMap<String, String>,
    /// End-user identifier forwarded to providers that accept one
    pub user: Option<String>,
}

fn unsupported(adapter: &(impl ProviderAdapter + ?Sized), capability: &str) -> LlmError {
    LlmError::UnsupportedOperation(format!(
        "{capability} is not supported by {}",
        adapter.provider_id()
    ))
}

/// One upstream protocol family behind the uniform call surface.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider id used in telemetry and error payloads.
    fn provider_id(&self) -> &str;

    /// The configured HTTP client (base URL, auth headers).
    fn client(&self) -> &ProviderClient;

    async fn chat(
        &self,
        _request: &ChatRequest,
        _options: &CallOptions,
    ) -> Result<ChunkStream, LlmError> {
        Err(unsupported(self, "chat"))
    }

    async fn embeddings(
        &self,
        _request: &EmbeddingRequest,
        _options: &CallOptions,
    ) -> Result<EmbeddingResponse, LlmError> {
        Err(unsupported(self, "embeddings"))
    }

    async fn create_image(
        &self,
        _request: &ImageRequest,
        _options: &CallOptions,
    ) -> Result<ImageResponse, LlmError> {
        Err(unsupported(self, "create_image"))
    }

    async fn generate_object(
        &self,
        _request: &ObjectRequest,
        _options: &CallOptions,
    ) -> Result<ObjectResponse, LlmError> {
        Err(unsupported(self, "generate_object"))
    }

    async fn text_to_speech(
        &self,
        _request: &SpeechRequest,
        _options: &CallOptions,
    ) -> Result<SpeechResponse, LlmError> {
        Err(unsupported(self, "text_to_speech"))
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        Err(unsupported(self, "models"))
    }
}
