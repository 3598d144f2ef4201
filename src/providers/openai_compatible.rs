//! OpenAI-compatible adapter
//!
//! Serves `openai`, `openai-compatible` and every vendor that speaks the
//! Chat Completions protocol (DeepSeek, Groq, xAI, OpenRouter, MiniMax,
//! Ollama, Together). GitHub Copilot reuses it with an exchanged token.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::time::Instant;

use super::http::{HttpHeaderBuilder, ProviderClient, send};
use super::{ApiType, CallOptions, ProviderAdapter};
use crate::config::ProviderSettings;
use crate::error::LlmError;
use crate::streaming::{
    ChunkStream, StreamContext, finish_stream, normalize_sse_response, normalize_values,
    run_cancellable,
};
use crate::transformers::business_error::detect_embedded_error;
use crate::transformers::openai::{OpenAiStreamTransformer, parse_usage};
use crate::transformers::StreamTransformer;
use crate::types::{
    ChatMessage, ChatRequest, ContentPart, EmbeddingRequest, EmbeddingResponse, GeneratedImage,
    ImageRequest, ImageResponse, MessageContent, ModelInfo, ObjectRequest,
    ObjectResponse, SpeechRequest, SpeechResponse,
};

pub struct OpenAiCompatibleAdapter {
    client: ProviderClient,
}

impl OpenAiCompatibleAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    /// Build from merged settings. `openai-compatible` has no default base
    /// URL, so one must be configured.
    pub fn from_settings(
        http: reqwest::Client,
        api_type: ApiType,
        settings: &ProviderSettings,
    ) -> Result<Self, LlmError> {
        let base_url = settings
            .base_url
            .clone()
            .or_else(|| api_type.default_base_url().map(str::to_string))
            .ok_or_else(|| {
                LlmError::ConfigurationError(format!("{api_type} requires a base_url"))
            })?;

        let mut headers = HttpHeaderBuilder::new().with_json_content_type();
        if let Some(key) = settings.expose_api_key() {
            headers = headers.with_bearer_auth(key)?;
        }
        if let Some(organization) = &settings.organization {
            headers = headers.with_header("OpenAI-Organization", organization)?;
        }
        if let Some(project) = &settings.project {
            headers = headers.with_header("OpenAI-Project", project)?;
        }
        let headers = headers.with_headers(&settings.headers)?.build();

        let provider_id = settings
            .provider_id
            .clone()
            .unwrap_or_else(|| api_type.as_str().to_string());
        let client = ProviderClient::new(http, provider_id, base_url, headers)
            .with_timeout(settings.timeout_secs.map(std::time::Duration::from_secs));
        Ok(Self::new(client))
    }

    fn transformer(&self) -> Arc<dyn StreamTransformer> {
        Arc::new(OpenAiStreamTransformer::new(self.client.provider_id.clone()))
    }

    /// POST and parse a JSON body, surfacing errors embedded in a 200.
    async fn post_for_json(
        &self,
        path: &str,
        body: &Value,
        options: &CallOptions,
    ) -> Result<Value, LlmError> {
        let signal = options.pipeline.signal.as_ref();
        let response = self.client.post_json(path, body, &options.headers, signal).await?;
        let value: Value = run_cancellable(signal, async { Ok(response.json().await?) }).await?;
        if let Some(error) = detect_embedded_error(&self.client.provider_id, &value) {
            return Err(error.into_error());
        }
        Ok(value)
    }
}

/// Chat message → Chat Completions message.
pub fn convert_message(message: &ChatMessage) -> Value {
    let mut out = Map::new();
    out.insert("role".into(), json!(message.role));
    let content = match &message.content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => Value::Array(
            parts
                .iter()
                .filter_map(|part| match part {
                    // Reasoning history is not accepted by this protocol.
                    ContentPart::Thinking { .. } => None,
                    other => serde_json::to_value(other).ok(),
                })
                .collect(),
        ),
    };
    out.insert("content".into(), content);
    if let Some(name) = &message.name {
        out.insert("name".into(), json!(name));
    }
    if let Some(calls) = &message.tool_calls
        && !calls.is_empty()
    {
        out.insert("tool_calls".into(), json!(calls));
    }
    if let Some(id) = &message.tool_call_id {
        out.insert("tool_call_id".into(), json!(id));
    }
    Value::Object(out)
}

/// Build a `/chat/completions` request body; `extra` is merged last.
pub fn build_chat_body(request: &ChatRequest, user: Option<&str>) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), json!(request.model));
    body.insert(
        "messages".into(),
        Value::Array(request.messages.iter().map(convert_message).collect()),
    );
    body.insert("stream".into(), json!(request.stream));
    if request.stream {
        body.insert("stream_options".into(), json!({"include_usage": true}));
    }
    if let Some(t) = request.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(max) = request.max_tokens {
        body.insert("max_tokens".into(), json!(max));
    }
    if let Some(tools) = &request.tools
        && !tools.is_empty()
    {
        body.insert("tools".into(), json!(tools));
    }
    if request.enabled_search == Some(true) {
        body.insert("web_search_options".into(), json!({}));
    }
    if let Some(user) = user {
        body.insert("user".into(), json!(user));
    }
    for (key, value) in &request.extra {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsBody {
    data: Vec<EmbeddingItem>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ImagesBody {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct ModelItem {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
    #[serde(default)]
    context_length: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ModelsBody {
    data: Vec<ModelItem>,
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider_id(&self) -> &str {
        &self.client.provider_id
    }

    fn client(&self) -> &ProviderClient {
        &self.client
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        options: &CallOptions,
    ) -> Result<ChunkStream, LlmError> {
        let started_at = Instant::now();
        let body = build_chat_body(request, options.user.as_deref());
        tracing::debug!(
            provider = %self.client.provider_id,
            model = %request.model,
            stream = request.stream,
            "sending chat completion"
        );
        let signal = options.pipeline.signal.as_ref();
        let response = self
            .client
            .post_json("chat/completions", &body, &options.headers, signal)
            .await?;

        let stream = if request.stream {
            normalize_sse_response(response, self.transformer(), StreamContext::generated())
        } else {
            let value: Value =
                run_cancellable(signal, async { Ok(response.json().await?) }).await?;
            normalize_values(vec![value], self.transformer(), StreamContext::generated())
        };
        finish_stream(stream, options.pipeline.clone(), started_at).await
    }

    async fn embeddings(
        &self,
        request: &EmbeddingRequest,
        options: &CallOptions,
    ) -> Result<EmbeddingResponse, LlmError> {
        let mut body = json!({"model": request.model, "input": request.input});
        if let Some(dimensions) = request.dimensions {
            body["dimensions"] = json!(dimensions);
        }
        let value = self.post_for_json("embeddings", &body, options).await?;
        let mut parsed: EmbeddingsBody = serde_json::from_value(value)?;
        parsed.data.sort_by_key(|item| item.index);
        Ok(EmbeddingResponse {
            embeddings: parsed.data.into_iter().map(|item| item.embedding).collect(),
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            usage: parsed.usage.as_ref().and_then(parse_usage),
        })
    }

    async fn create_image(
        &self,
        request: &ImageRequest,
        options: &CallOptions,
    ) -> Result<ImageResponse, LlmError> {
        let mut body = json!({"model": request.model, "prompt": request.prompt});
        if let Some(size) = &request.size {
            body["size"] = json!(size);
        }
        if let Some(n) = request.n {
            body["n"] = json!(n);
        }
        if let Some(quality) = &request.quality {
            body["quality"] = json!(quality);
        }
        let value = self.post_for_json("images/generations", &body, options).await?;
        let parsed: ImagesBody = serde_json::from_value(value)?;
        Ok(ImageResponse {
            images: parsed.data,
        })
    }

    async fn generate_object(
        &self,
        request: &ObjectRequest,
        options: &CallOptions,
    ) -> Result<ObjectResponse, LlmError> {
        let mut chat = ChatRequest::new(request.model.clone(), request.messages.clone())
            .with_stream(false);
        chat.temperature = request.temperature;
        chat.extra.insert(
            "response_format".into(),
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                    "strict": true,
                }
            }),
        );
        let body = build_chat_body(&chat, options.user.as_deref());
        let value = self.post_for_json("chat/completions", &body, options).await?;
        let content = value
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LlmError::StreamParseError("Structured output response has no content".into())
            })?;
        let object = serde_json::from_str(content).map_err(|e| {
            LlmError::StreamParseError(format!("Structured output is not valid JSON: {e}"))
        })?;
        Ok(ObjectResponse {
            object,
            usage: value.get("usage").and_then(parse_usage),
        })
    }

    async fn text_to_speech(
        &self,
        request: &SpeechRequest,
        options: &CallOptions,
    ) -> Result<SpeechResponse, LlmError> {
        let mut body = json!({
            "model": request.model,
            "input": request.input,
            "voice": request.voice,
        });
        if let Some(format) = &request.response_format {
            body["response_format"] = json!(format);
        }
        if let Some(speed) = request.speed {
            body["speed"] = json!(speed);
        }
        let signal = options.pipeline.signal.as_ref();
        let response = self
            .client
            .post_json("audio/speech", &body, &options.headers, signal)
            .await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let audio = run_cancellable(signal, async { Ok(response.bytes().await?) }).await?;
        Ok(SpeechResponse {
            audio,
            content_type,
        })
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let builder = self
            .client
            .request(Method::GET, "models", &Default::default())?;
        let response = send(builder, &self.client.provider_id, None).await?;
        let parsed: ModelsBody = response.json().await?;
        Ok(parsed
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                display_name: None,
                owned_by: m.owned_by,
                context_window: m.context_length,
            })
            .collect())
    }
}
