//! Google GenAI adapter (Gemini API and Vertex AI)
//!
//! Both hosts speak the same `generateContent` protocol. They differ in
//! URL layout and auth: the Gemini API takes an `x-goog-api-key`, Vertex AI
//! a bearer token, usually exchanged from a service account.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
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
use crate::transformers::business_error::detect_embedded_error;
use crate::transformers::google::{GoogleStreamTransformer, parse_usage};
use crate::types::{
    ChatMessage, ChatRequest, ContentPart, EmbeddingRequest, EmbeddingResponse, GeneratedImage,
    ImageRequest, ImageResponse, MediaUrl, MessageRole, ModelInfo, ObjectRequest, ObjectResponse,
};

#[cfg(feature = "gcp")]
use crate::auth::{ServiceAccountExchanger, TokenManager};

/// Keys of `ChatRequest::extra` that belong in `generationConfig`.
const GENERATION_CONFIG_KEYS: &[&str] = &[
    "responseModalities",
    "responseMimeType",
    "responseSchema",
    "candidateCount",
    "stopSequences",
    "seed",
];

/// How requests are authenticated.
#[derive(Clone)]
pub enum GoogleAuth {
    None,
    ApiKey(SecretString),
    Bearer(SecretString),
    #[cfg(feature = "gcp")]
    ServiceAccount {
        credential: SecretString,
        tokens: TokenManager<ServiceAccountExchanger>,
    },
}

pub struct GoogleAdapter {
    client: ProviderClient,
    auth: GoogleAuth,
    vertex: bool,
}

/// Vertex AI publisher base URL for a project and location.
pub fn vertex_base_url(project: &str, location: &str) -> String {
    let host = if location == "global" {
        "aiplatform.googleapis.com".to_string()
    } else {
        format!("{location}-aiplatform.googleapis.com")
    };
    format!("https://{host}/v1/projects/{project}/locations/{location}/publishers/google")
}

impl GoogleAdapter {
    pub fn new(client: ProviderClient, auth: GoogleAuth, vertex: bool) -> Self {
        Self {
            client,
            auth,
            vertex,
        }
    }

    /// `project` is only consulted for Vertex AI when no base URL is set.
    pub fn from_settings(
        http: reqwest::Client,
        api_type: ApiType,
        settings: &ProviderSettings,
        auth: GoogleAuth,
        project: Option<&str>,
    ) -> Result<Self, LlmError> {
        let vertex = api_type == ApiType::VertexAi;
        let base_url = match (&settings.base_url, vertex) {
            (Some(url), _) => url.clone(),
            (None, true) => {
                let project = settings.project.as_deref().or(project).ok_or_else(|| {
                    LlmError::ConfigurationError("vertexai requires a project".into())
                })?;
                let location = settings.location.as_deref().unwrap_or("us-central1");
                vertex_base_url(project, location)
            }
            (None, false) => api_type
                .default_base_url()
                .map(str::to_string)
                .unwrap_or_default(),
        };

        let mut headers = HttpHeaderBuilder::new().with_json_content_type();
        match &auth {
            GoogleAuth::ApiKey(key) => {
                headers = headers.with_header("x-goog-api-key", key.expose_secret())?;
            }
            GoogleAuth::Bearer(token) => {
                headers = headers.with_bearer_auth(token.expose_secret())?;
            }
            _ => {}
        }
        let headers = headers.with_headers(&settings.headers)?.build();
        let provider_id = settings
            .provider_id
            .clone()
            .unwrap_or_else(|| api_type.as_str().to_string());
        let client = ProviderClient::new(http, provider_id, base_url, headers)
            .with_timeout(settings.timeout_secs.map(std::time::Duration::from_secs));
        Ok(Self::new(client, auth, vertex))
    }

    fn transformer(&self) -> Arc<dyn StreamTransformer> {
        Arc::new(GoogleStreamTransformer::new(self.client.provider_id.clone()))
    }

    /// Bearer from the token cache when authenticating with a service account.
    #[cfg(feature = "gcp")]
    async fn exchanged_bearer(&self) -> Result<Option<String>, LlmError> {
        match &self.auth {
            GoogleAuth::ServiceAccount { credential, tokens } => {
                let token = tokens.get_token(credential).await?;
                Ok(Some(format!("Bearer {}", token.token.expose_secret())))
            }
            _ => Ok(None),
        }
    }

    #[cfg(not(feature = "gcp"))]
    async fn exchanged_bearer(&self) -> Result<Option<String>, LlmError> {
        Ok(None)
    }

    /// A rejected exchanged token is dropped so the next call exchanges again.
    #[cfg(feature = "gcp")]
    async fn reject_token(&self) {
        if let GoogleAuth::ServiceAccount { credential, tokens } = &self.auth {
            tokens.invalidate_credential(credential).await;
        }
    }

    #[cfg(not(feature = "gcp"))]
    async fn reject_token(&self) {}

    async fn post(
        &self,
        path: &str,
        body: &Value,
        options: &CallOptions,
    ) -> Result<reqwest::Response, LlmError> {
        let mut headers: BTreeMap<String, String> = options.headers.clone();
        if let Some(bearer) = self.exchanged_bearer().await? {
            headers.insert("authorization".into(), bearer);
        }
        let result = self
            .client
            .post_json(path, body, &headers, options.pipeline.signal.as_ref())
            .await;
        if matches!(result, Err(LlmError::InvalidCredential { .. })) {
            self.reject_token().await;
        }
        result
    }

    async fn post_for_json(
        &self,
        path: &str,
        body: &Value,
        options: &CallOptions,
    ) -> Result<Value, LlmError> {
        let response = self.post(path, body, options).await?;
        let value: Value = run_cancellable(options.pipeline.signal.as_ref(), async {
            Ok(response.json().await?)
        })
        .await?;
        if let Some(error) = detect_embedded_error(&self.client.provider_id, &value) {
            return Err(error.into_error());
        }
        Ok(value)
    }
}

fn model_path(model: &str, method: &str) -> String {
    format!("models/{}:{method}", model.trim_start_matches("models/"))
}

fn mime_from_url(url: &str, fallback: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        _ => fallback,
    }
    .to_string()
}

fn media_part(media: &MediaUrl, fallback_mime: &str) -> Value {
    match media.as_data_url() {
        Some((mime, data)) => json!({"inlineData": {"mimeType": mime, "data": data}}),
        None => json!({
            "fileData": {"fileUri": media.url, "mimeType": mime_from_url(&media.url, fallback_mime)}
        }),
    }
}

fn content_parts(message: &ChatMessage) -> Vec<Value> {
    message
        .content
        .parts()
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if !text.is_empty() => Some(json!({"text": text})),
            ContentPart::Text { .. } => None,
            ContentPart::ImageUrl { image_url } => Some(media_part(image_url, "image/jpeg")),
            ContentPart::VideoUrl { video_url } => Some(media_part(video_url, "video/mp4")),
            ContentPart::Thinking {
                thinking,
                signature,
            } => {
                let mut part = json!({"text": thinking, "thought": true});
                if let Some(signature) = signature {
                    part["thoughtSignature"] = json!(signature);
                }
                Some(part)
            }
        })
        .collect()
}

/// Split chat history into `systemInstruction` and `contents`.
pub fn convert_messages(messages: &[ChatMessage]) -> (Option<Value>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut contents: Vec<(&'static str, Vec<Value>)> = Vec::new();
    let mut tool_names: HashMap<&str, &str> = HashMap::new();

    for message in messages {
        let (role, parts) = match message.role {
            MessageRole::System => {
                let text = message.content.text();
                if !text.is_empty() {
                    system_parts.push(json!({"text": text}));
                }
                continue;
            }
            MessageRole::User => ("user", content_parts(message)),
            MessageRole::Assistant => {
                let mut parts = content_parts(message);
                for call in message.tool_calls.iter().flatten() {
                    tool_names.insert(call.id.as_str(), call.function.name.as_str());
                    let args: Value = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| json!({}));
                    parts.push(json!({"functionCall": {"name": call.function.name, "args": args}}));
                }
                ("model", parts)
            }
            MessageRole::Tool | MessageRole::Function => {
                let name = message
                    .name
                    .as_deref()
                    .or_else(|| {
                        message
                            .tool_call_id
                            .as_deref()
                            .and_then(|id| tool_names.get(id).copied())
                    })
                    .unwrap_or_default();
                let text = message.content.text();
                let content = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
                (
                    "user",
                    vec![json!({
                        "functionResponse": {"name": name, "response": {"name": name, "content": content}}
                    })],
                )
            }
        };
        if parts.is_empty() {
            continue;
        }
        match contents.last_mut() {
            Some((last_role, last_parts)) if *last_role == role => last_parts.extend(parts),
            _ => contents.push((role, parts)),
        }
    }

    let system = (!system_parts.is_empty()).then(|| json!({"parts": system_parts}));
    let contents = contents
        .into_iter()
        .map(|(role, parts)| json!({"role": role, "parts": parts}))
        .collect();
    (system, contents)
}

/// Build a `generateContent` request body.
pub fn build_request_body(request: &ChatRequest) -> Value {
    let (system, contents) = convert_messages(&request.messages);
    let mut body = Map::new();
    body.insert("contents".into(), Value::Array(contents));
    if let Some(system) = system {
        body.insert("systemInstruction".into(), system);
    }

    let mut generation = Map::new();
    if let Some(t) = request.temperature {
        generation.insert("temperature".into(), json!(t));
    }
    if let Some(p) = request.top_p {
        generation.insert("topP".into(), json!(p));
    }
    if let Some(max) = request.max_tokens {
        generation.insert("maxOutputTokens".into(), json!(max));
    }
    if let Some(thinking) = &request.thinking {
        let budget = if thinking.is_enabled() {
            thinking.budget_tokens.map(|b| json!(b)).unwrap_or(json!(-1))
        } else {
            json!(0)
        };
        generation.insert(
            "thinkingConfig".into(),
            json!({"thinkingBudget": budget, "includeThoughts": thinking.is_enabled()}),
        );
    }

    let mut tools = Vec::new();
    if let Some(declared) = &request.tools
        && !declared.is_empty()
    {
        let declarations: Vec<Value> = declared
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.function.name,
                    "description": tool.function.description.clone().unwrap_or_default(),
                    "parameters": tool.function.parameters,
                })
            })
            .collect();
        tools.push(json!({"functionDeclarations": declarations}));
    }
    if request.enabled_search == Some(true) {
        tools.push(json!({"googleSearch": {}}));
    }
    if !tools.is_empty() {
        body.insert("tools".into(), Value::Array(tools));
    }

    for (key, value) in &request.extra {
        if GENERATION_CONFIG_KEYS.contains(&key.as_str()) {
            generation.insert(key.clone(), value.clone());
        } else {
            body.insert(key.clone(), value.clone());
        }
    }
    if !generation.is_empty() {
        body.insert("generationConfig".into(), Value::Object(generation));
    }
    Value::Object(body)
}

/// Concatenated non-thought text of the first candidate.
fn candidate_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.get("thought").and_then(Value::as_bool) != Some(true))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleModel {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ModelsBody {
    #[serde(default)]
    models: Vec<GoogleModel>,
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
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
        let body = build_request_body(request);
        tracing::debug!(
            provider = %self.client.provider_id,
            model = %request.model,
            stream = request.stream,
            vertex = self.vertex,
            "sending generateContent"
        );
        let stream = if request.stream {
            let path = format!("{}?alt=sse", model_path(&request.model, "streamGenerateContent"));
            let response = self.post(&path, &body, options).await?;
            normalize_sse_response(response, self.transformer(), StreamContext::generated())
        } else {
            let value = self
                .post_for_json(&model_path(&request.model, "generateContent"), &body, options)
                .await?;
            normalize_values(vec![value], self.transformer(), StreamContext::generated())
        };
        finish_stream(stream, options.pipeline.clone(), started_at).await
    }

    async fn embeddings(
        &self,
        request: &EmbeddingRequest,
        options: &CallOptions,
    ) -> Result<EmbeddingResponse, LlmError> {
        let model = request.model.trim_start_matches("models/");
        let embeddings = if self.vertex {
            let mut body = json!({
                "instances": request.input.iter().map(|text| json!({"content": text})).collect::<Vec<_>>(),
            });
            if let Some(dimensions) = request.dimensions {
                body["parameters"] = json!({"outputDimensionality": dimensions});
            }
            let value = self
                .post_for_json(&model_path(model, "predict"), &body, options)
                .await?;
            collect_vectors(&value, "predictions", "/embeddings/values")?
        } else {
            let requests: Vec<Value> = request
                .input
                .iter()
                .map(|text| {
                    let mut item = json!({
                        "model": format!("models/{model}"),
                        "content": {"parts": [{"text": text}]},
                    });
                    if let Some(dimensions) = request.dimensions {
                        item["outputDimensionality"] = json!(dimensions);
                    }
                    item
                })
                .collect();
            let value = self
                .post_for_json(
                    &model_path(model, "batchEmbedContents"),
                    &json!({"requests": requests}),
                    options,
                )
                .await?;
            collect_vectors(&value, "embeddings", "/values")?
        };
        Ok(EmbeddingResponse {
            embeddings,
            model: model.to_string(),
            usage: None,
        })
    }

    async fn create_image(
        &self,
        request: &ImageRequest,
        options: &CallOptions,
    ) -> Result<ImageResponse, LlmError> {
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
            "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]},
        });
        if let Some(n) = request.n {
            body["generationConfig"]["candidateCount"] = json!(n);
        }
        let value = self
            .post_for_json(&model_path(&request.model, "generateContent"), &body, options)
            .await?;
        let images = value
            .get("candidates")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|c| c.pointer("/content/parts").and_then(Value::as_array))
            .flatten()
            .filter_map(|part| part.get("inlineData"))
            .filter_map(|data| {
                let payload = data.get("data").and_then(Value::as_str)?;
                Some(GeneratedImage {
                    url: None,
                    b64_json: Some(payload.to_string()),
                    revised_prompt: None,
                })
            })
            .collect();
        Ok(ImageResponse { images })
    }

    async fn generate_object(
        &self,
        request: &ObjectRequest,
        options: &CallOptions,
    ) -> Result<ObjectResponse, LlmError> {
        let mut chat = ChatRequest::new(request.model.clone(), request.messages.clone())
            .with_stream(false);
        chat.temperature = request.temperature;
        chat.extra
            .insert("responseMimeType".into(), json!("application/json"));
        chat.extra
            .insert("responseSchema".into(), request.schema.clone());
        let body = build_request_body(&chat);
        let value = self
            .post_for_json(&model_path(&request.model, "generateContent"), &body, options)
            .await?;
        let text = candidate_text(&value);
        let object = serde_json::from_str(&text).map_err(|e| {
            LlmError::StreamParseError(format!("Structured output is not valid JSON: {e}"))
        })?;
        Ok(ObjectResponse {
            object,
            usage: value.get("usageMetadata").map(parse_usage),
        })
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        if self.vertex {
            return Err(LlmError::UnsupportedOperation(
                "models is not supported by vertexai".into(),
            ));
        }
        let builder = self
            .client
            .request(Method::GET, "models", &Default::default())?;
        let response = send(builder, &self.client.provider_id, None).await?;
        let parsed: ModelsBody = response.json().await?;
        Ok(parsed
            .models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.trim_start_matches("models/").to_string(),
                display_name: m.display_name,
                owned_by: Some("google".to_string()),
                context_window: m.input_token_limit,
            })
            .collect())
    }
}

fn collect_vectors(value: &Value, list: &str, pointer: &str) -> Result<Vec<Vec<f32>>, LlmError> {
    value
        .get(list)
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::StreamParseError(format!("embedding response has no {list}")))?
        .iter()
        .map(|item| {
            item.pointer(pointer)
                .cloned()
                .ok_or_else(|| LlmError::StreamParseError("embedding without values".into()))
                .and_then(|v| Ok(serde_json::from_value::<Vec<f32>>(v)?))
        })
        .collect()
}
