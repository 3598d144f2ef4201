//! Anthropic Messages API adapter
//!
//! System messages are lifted into the top-level `system` field, tool
//! results travel as `tool_result` blocks inside user turns, and the last
//! system block and last tool carry an ephemeral `cache_control` marker.

pub mod replay;

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
use crate::transformers::StreamTransformer;
use crate::transformers::anthropic::{AnthropicStreamTransformer, parse_usage};
use crate::transformers::business_error::detect_embedded_error;
use crate::types::{
    ChatMessage, ChatRequest, ContentPart, MediaUrl, MessageContent, MessageRole, ModelInfo,
    ObjectRequest, ObjectResponse, Tool,
};

pub const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    client: ProviderClient,
}

impl AnthropicAdapter {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    pub fn from_settings(
        http: reqwest::Client,
        settings: &ProviderSettings,
    ) -> Result<Self, LlmError> {
        let base_url = settings
            .base_url
            .clone()
            .or_else(|| ApiType::Anthropic.default_base_url().map(str::to_string))
            .unwrap_or_default();
        let mut headers = HttpHeaderBuilder::new()
            .with_json_content_type()
            .with_header(
                "anthropic-version",
                settings.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION),
            )?;
        if let Some(key) = settings.expose_api_key() {
            headers = headers.with_header("x-api-key", key)?;
        }
        let headers = headers.with_headers(&settings.headers)?.build();
        let provider_id = settings
            .provider_id
            .clone()
            .unwrap_or_else(|| ApiType::Anthropic.as_str().to_string());
        let client = ProviderClient::new(http, provider_id, base_url, headers)
            .with_timeout(settings.timeout_secs.map(std::time::Duration::from_secs));
        Ok(Self::new(client))
    }

    fn transformer(&self) -> Arc<dyn StreamTransformer> {
        Arc::new(AnthropicStreamTransformer::new(self.client.provider_id.clone()))
    }

    async fn post_message(&self, body: &Value, options: &CallOptions) -> Result<Value, LlmError> {
        let signal = options.pipeline.signal.as_ref();
        let response = self
            .client
            .post_json("messages", body, &options.headers, signal)
            .await?;
        let value: Value = run_cancellable(signal, async { Ok(response.json().await?) }).await?;
        if let Some(error) = detect_embedded_error(&self.client.provider_id, &value) {
            return Err(error.into_error());
        }
        Ok(value)
    }
}

fn ephemeral() -> Value {
    json!({"type": "ephemeral"})
}

fn image_block(media: &MediaUrl) -> Value {
    match media.as_data_url() {
        Some((media_type, data)) => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": media_type, "data": data},
        }),
        None => json!({"type": "image", "source": {"type": "url", "url": media.url}}),
    }
}

fn content_blocks(content: &MessageContent) -> Vec<Value> {
    content
        .parts()
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if !text.is_empty() => {
                Some(json!({"type": "text", "text": text}))
            }
            ContentPart::Text { .. } => None,
            ContentPart::ImageUrl { image_url } => Some(image_block(image_url)),
            ContentPart::VideoUrl { .. } => None,
            ContentPart::Thinking {
                thinking,
                signature,
            } => Some(json!({
                "type": "thinking",
                "thinking": thinking,
                "signature": signature.clone().unwrap_or_default(),
            })),
        })
        .collect()
}

/// Split chat history into the `system` blocks and Messages API turns.
/// Consecutive messages that map to the same role are merged.
pub fn convert_messages(messages: &[ChatMessage]) -> (Vec<Value>, Vec<Value>) {
    let mut system = Vec::new();
    let mut turns: Vec<(String, Vec<Value>)> = Vec::new();

    for message in messages {
        let (role, blocks) = match message.role {
            MessageRole::System => {
                let text = message.content.text();
                if !text.is_empty() {
                    system.push(json!({"type": "text", "text": text}));
                }
                continue;
            }
            MessageRole::User => ("user", content_blocks(&message.content)),
            MessageRole::Assistant => {
                let mut blocks = content_blocks(&message.content);
                for call in message.tool_calls.iter().flatten() {
                    let input: Value = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| json!({}));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.function.name,
                        "input": input,
                    }));
                }
                ("assistant", blocks)
            }
            MessageRole::Tool | MessageRole::Function => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.content.text(),
                })],
            ),
        };
        if blocks.is_empty() {
            continue;
        }
        match turns.last_mut() {
            Some((last_role, last_blocks)) if last_role == role => last_blocks.extend(blocks),
            _ => turns.push((role.to_string(), blocks)),
        }
    }

    if let Some(last) = system.last_mut() {
        last["cache_control"] = ephemeral();
    }
    let turns = turns
        .into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect();
    (system, turns)
}

fn convert_tools(tools: &[Tool]) -> Vec<Value> {
    let mut out: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let mut value = json!({
                "name": tool.function.name,
                "input_schema": tool.function.parameters,
            });
            if let Some(description) = &tool.function.description {
                value["description"] = json!(description);
            }
            value
        })
        .collect();
    if let Some(last) = out.last_mut() {
        last["cache_control"] = ephemeral();
    }
    out
}

/// Build a Messages API request body; `extra` is merged last.
pub fn build_request_body(request: &ChatRequest, user: Option<&str>) -> Value {
    let (system, messages) = convert_messages(&request.messages);
    let mut body = Map::new();
    body.insert("model".into(), json!(request.model));
    body.insert("messages".into(), Value::Array(messages));
    body.insert(
        "max_tokens".into(),
        json!(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    body.insert("stream".into(), json!(request.stream));
    if !system.is_empty() {
        body.insert("system".into(), Value::Array(system));
    }
    if let Some(tools) = &request.tools
        && !tools.is_empty()
    {
        body.insert("tools".into(), Value::Array(convert_tools(tools)));
    }
    if let Some(thinking) = &request.thinking
        && thinking.is_enabled()
    {
        body.insert(
            "thinking".into(),
            json!({"type": "enabled", "budget_tokens": thinking.budget_tokens.unwrap_or(1024)}),
        );
    } else {
        // Sampling parameters are rejected while extended thinking is on.
        if let Some(t) = request.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = request.top_p {
            body.insert("top_p".into(), json!(p));
        }
    }
    if let Some(user) = user {
        body.insert("metadata".into(), json!({"user_id": user}));
    }
    for (key, value) in &request.extra {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}

#[derive(Debug, Deserialize)]
struct ModelItem {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsBody {
    data: Vec<ModelItem>,
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
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
        let body = build_request_body(request, options.user.as_deref());
        tracing::debug!(
            provider = %self.client.provider_id,
            model = %request.model,
            stream = request.stream,
            "sending messages request"
        );
        let stream = if request.stream {
            let response = self
                .client
                .post_json("messages", &body, &options.headers, options.pipeline.signal.as_ref())
                .await?;
            normalize_sse_response(response, self.transformer(), StreamContext::generated())
        } else {
            let message = self.post_message(&body, options).await?;
            let events = replay::replay_message(&message)?;
            normalize_values(events, self.transformer(), StreamContext::generated())
        };
        finish_stream(stream, options.pipeline.clone(), started_at).await
    }

    async fn generate_object(
        &self,
        request: &ObjectRequest,
        options: &CallOptions,
    ) -> Result<ObjectResponse, LlmError> {
        let mut chat = ChatRequest::new(request.model.clone(), request.messages.clone())
            .with_stream(false)
            .with_tools(vec![Tool::function(
                request.schema_name.clone(),
                "Respond with an object matching this schema",
                request.schema.clone(),
            )]);
        chat.temperature = request.temperature;
        chat.extra.insert(
            "tool_choice".into(),
            json!({"type": "tool", "name": request.schema_name}),
        );
        let body = build_request_body(&chat, options.user.as_deref());
        let message = self.post_message(&body, options).await?;
        let object = message
            .get("content")
            .and_then(Value::as_array)
            .and_then(|blocks| {
                blocks.iter().find(|b| {
                    b.get("type").and_then(Value::as_str) == Some("tool_use")
                        && b.get("name").and_then(Value::as_str) == Some(&request.schema_name)
                })
            })
            .and_then(|block| block.get("input").cloned())
            .ok_or_else(|| {
                LlmError::StreamParseError("Response did not call the output tool".into())
            })?;
        Ok(ObjectResponse {
            object,
            usage: message.get("usage").map(parse_usage),
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
                display_name: m.display_name,
                owned_by: Some("anthropic".to_string()),
                context_window: None,
            })
            .collect())
    }
}
