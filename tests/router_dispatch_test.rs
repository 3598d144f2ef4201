//! Routing and fallback against mocked provider endpoints

use std::sync::Arc;

use futures_util::StreamExt;
use model_runtime::prelude::*;
use model_runtime::router::MemoryAttemptSink;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(text: &str) -> ResponseTemplate {
    let body = format!(
        "data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
        json!({"id": "chatcmpl-9", "choices": [{"index": 0, "delta": {"content": text}}]}),
        json!({"id": "chatcmpl-9", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
    );
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn request(model: &str) -> ChatRequest {
    ChatRequest::new(model, vec![ChatMessage::user("weather in Paris?")])
}

async fn collect_text(stream: ChunkStream) -> String {
    stream
        .filter_map(|chunk| async move {
            match chunk.data {
                ChunkData::Text(t) => Some(t),
                _ => None,
            }
        })
        .collect::<Vec<_>>()
        .await
        .concat()
}

async fn mount(server: &MockServer, prefix: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("{prefix}/chat/completions")))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

fn runtime_from_json(config: serde_json::Value, sink: Arc<MemoryAttemptSink>) -> UniformRuntime {
    let config = RuntimeConfig::from_json(&config.to_string()).unwrap();
    UniformRuntime::builder()
        .routers(config.routers)
        .settings(config.settings)
        .sink(sink)
        .env_lookup(|_| None)
        .build()
        .unwrap()
}

#[tokio::test]
async fn endpoint_pinned_router_beats_model_list() {
    let server = MockServer::start().await;
    mount(&server, "/pinned", sse("from pinned"), 1).await;
    mount(&server, "/by-model", sse("from model list"), 0).await;

    let sink = Arc::new(MemoryAttemptSink::new());
    let runtime = runtime_from_json(
        json!({
            "routers": [
                {"id": "by-model", "apiType": "openai", "models": ["gpt-4o"],
                 "options": {"apiKey": "k1", "baseURL": format!("{}/by-model", server.uri())}},
                {"id": "pinned", "apiType": "openai", "baseUrlPattern": "^https://gateway\\.example",
                 "options": {"apiKey": "k2", "baseURL": format!("{}/pinned", server.uri())}},
                {"id": "catch-all", "apiType": "openai", "options": {"apiKey": "k3"}}
            ],
            "settings": {"baseURL": "https://gateway.example/v1"}
        }),
        sink.clone(),
    );

    let stream = runtime.chat(request("gpt-4o"), RequestOptions::new()).await.unwrap();
    assert_eq!(collect_text(stream).await, "from pinned");
    assert_eq!(sink.attempts()[0].router_id.as_deref(), Some("pinned"));
}

#[tokio::test]
async fn unmatched_model_goes_to_the_last_router() {
    let server = MockServer::start().await;
    mount(&server, "/first", sse("first"), 0).await;
    mount(&server, "/last", sse("last"), 1).await;

    let sink = Arc::new(MemoryAttemptSink::new());
    let runtime = runtime_from_json(
        json!({
            "routers": [
                {"id": "first", "apiType": "openai", "models": ["gpt-4o"],
                 "options": {"apiKey": "k", "baseURL": format!("{}/first", server.uri())}},
                {"id": "last", "apiType": "deepseek", "models": ["deepseek-chat"],
                 "options": {"apiKey": "k", "baseURL": format!("{}/last", server.uri())}}
            ]
        }),
        sink.clone(),
    );

    let stream = runtime.chat(request("llama-3"), RequestOptions::new()).await.unwrap();
    assert_eq!(collect_text(stream).await, "last");
    let attempt = &sink.attempts()[0];
    assert_eq!(attempt.api_type, ApiType::DeepSeek);
    assert_eq!(attempt.model, "llama-3");
}

#[tokio::test]
async fn every_option_fails_once_and_the_last_error_wins() {
    let server = MockServer::start().await;
    mount(&server, "/a", ResponseTemplate::new(500).set_body_string("upstream exploded"), 1).await;
    mount(
        &server,
        "/b",
        ResponseTemplate::new(429)
            .insert_header("retry-after", "3")
            .set_body_json(json!({"error": {"message": "slow down", "type": "rate_limit"}})),
        1,
    )
    .await;
    mount(
        &server,
        "/c",
        ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})),
        1,
    )
    .await;

    let sink = Arc::new(MemoryAttemptSink::new());
    let runtime = runtime_from_json(
        json!({
            "routers": [{"id": "main", "apiType": "openai", "options": [
                {"id": "a", "apiKey": "k", "baseURL": format!("{}/a", server.uri())},
                {"id": "b", "apiKey": "k", "baseURL": format!("{}/b", server.uri())},
                {"id": "c", "apiKey": "k", "baseURL": format!("{}/c", server.uri())}
            ]}]
        }),
        sink.clone(),
    );

    let err = runtime
        .chat(request("gpt-4o"), RequestOptions::new())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidCredential);

    let attempts = sink.attempts();
    let kinds: Vec<_> = attempts
        .iter()
        .map(|a| a.error.as_ref().map(LlmError::kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            Some(ErrorKind::ProviderBusinessError),
            Some(ErrorKind::RateLimited),
            Some(ErrorKind::InvalidCredential),
        ]
    );
    assert!(attempts.iter().all(|a| !a.success));
}

#[tokio::test]
async fn success_stops_the_option_walk() {
    let server = MockServer::start().await;
    mount(&server, "/a", ResponseTemplate::new(503), 1).await;
    mount(&server, "/b", sse("recovered"), 1).await;
    mount(&server, "/c", sse("never"), 0).await;

    let sink = Arc::new(MemoryAttemptSink::new());
    let runtime = runtime_from_json(
        json!({
            "routers": [{"id": "main", "apiType": "openai", "options": [
                {"id": "a", "apiKey": "k", "baseURL": format!("{}/a", server.uri())},
                {"id": "b", "remark": "backup", "apiKey": "k", "baseURL": format!("{}/b", server.uri())},
                {"id": "c", "apiKey": "k", "baseURL": format!("{}/c", server.uri())}
            ]}]
        }),
        sink.clone(),
    );

    let stream = runtime.chat(request("gpt-4o"), RequestOptions::new()).await.unwrap();
    assert_eq!(collect_text(stream).await, "recovered");

    let attempts = sink.attempts();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[1].channel_id.as_deref(), Some("b"));
    assert_eq!(attempts[1].remark.as_deref(), Some("backup"));
    assert!(attempts[1].success);
}

#[tokio::test]
async fn in_band_error_on_first_chunk_triggers_fallback() {
    let server = MockServer::start().await;
    let quota = format!(
        "data: {}\n\n",
        json!({"error": {"message": "quota exhausted", "code": "insufficient_quota"}})
    );
    mount(&server, "/a", ResponseTemplate::new(200).set_body_raw(quota, "text/event-stream"), 1).await;
    mount(&server, "/b", sse("second"), 1).await;

    let runtime = runtime_from_json(
        json!({
            "routers": [{"apiType": "openai", "options": [
                {"apiKey": "k", "baseURL": format!("{}/a", server.uri())},
                {"apiKey": "k", "baseURL": format!("{}/b", server.uri())}
            ]}]
        }),
        Arc::new(MemoryAttemptSink::new()),
    );

    let stream = runtime.chat(request("gpt-4o"), RequestOptions::new()).await.unwrap();
    assert_eq!(collect_text(stream).await, "second");
}

#[tokio::test]
async fn option_api_type_overrides_the_router() {
    let server = MockServer::start().await;
    mount(&server, "/openai", ResponseTemplate::new(500), 1).await;
    Mock::given(method("POST"))
        .and(path("/anthropic/messages"))
        .and(header("x-api-key", "ak"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "hello from claude"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = UniformRuntime::builder()
        .router(
            RouterEntry::new(ApiType::OpenAi)
                .option(RouterOption::new().api_key("k").base_url(format!("{}/openai", server.uri())))
                .option(
                    RouterOption::new()
                        .api_type(ApiType::Anthropic)
                        .api_key("ak")
                        .base_url(format!("{}/anthropic", server.uri())),
                ),
        )
        .env_lookup(|_| None)
        .build()
        .unwrap();

    let stream = runtime
        .chat(request("claude-sonnet-4").with_stream(false), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(collect_text(stream).await, "hello from claude");
}

#[tokio::test]
async fn embeddings_route_like_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "text-embedding-3-small",
            "data": [
                {"index": 1, "embedding": [0.3, 0.4]},
                {"index": 0, "embedding": [0.1, 0.2]}
            ],
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = UniformRuntime::builder()
        .router(RouterEntry::new(ApiType::OpenAi).option(RouterOption::new().api_key("k").base_url(server.uri())))
        .env_lookup(|_| None)
        .build()
        .unwrap();

    let response = runtime
        .embeddings(
            EmbeddingRequest::new("text-embedding-3-small", vec!["a".into(), "b".into()]),
            RequestOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(response.embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
}
