//! Caller cancellation during request setup and while streaming

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use model_runtime::prelude::*;
use model_runtime::streaming::{Completion, PipelineOptions, finish_stream};
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stalled_stream(chunks: Vec<StreamChunk>) -> ChunkStream {
    Box::pin(futures_util::stream::iter(chunks).chain(futures_util::stream::pending()))
}

#[tokio::test]
async fn cancel_after_content_yields_a_stop_marker() {
    let signal = CancelHandle::new();
    let options = PipelineOptions {
        signal: Some(signal.clone()),
        ..Default::default()
    };
    let mut stream = finish_stream(
        stalled_stream(vec![StreamChunk::text("s1", "partial")]),
        options,
        tokio::time::Instant::now(),
    )
    .await
    .unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.data, ChunkData::Text("partial".into()));

    signal.cancel();
    let marker = stream.next().await.unwrap();
    assert_eq!(marker.data, ChunkData::Stop(FinishReason::Cancelled));
    assert!(stream.next().await.is_none());
}

#[derive(Default)]
struct FinalCounter {
    finals: AtomicUsize,
    cancelled: AtomicUsize,
}

#[async_trait]
impl StreamCallbacks for FinalCounter {
    async fn on_final(&self, completion: &Completion) {
        self.finals.fetch_add(1, Ordering::SeqCst);
        if completion.is_cancelled() {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn callbacks_see_the_cancelled_completion_once() {
    let signal = CancelHandle::new();
    let counter = Arc::new(FinalCounter::default());
    let options = PipelineOptions {
        signal: Some(signal.clone()),
        callbacks: Some(counter.clone()),
        ..Default::default()
    };
    let mut stream = finish_stream(
        stalled_stream(vec![StreamChunk::text("s1", "a"), StreamChunk::text("s1", "b")]),
        options,
        tokio::time::Instant::now(),
    )
    .await
    .unwrap();

    stream.next().await.unwrap();
    stream.next().await.unwrap();
    signal.cancel();
    while stream.next().await.is_some() {}

    assert_eq!(counter.finals.load(Ordering::SeqCst), 1);
    assert_eq!(counter.cancelled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancel_during_the_handshake_is_an_error_without_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": []}))
                .set_delay(Duration::from_secs(30)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let runtime = UniformRuntime::builder()
        .router(
            RouterEntry::new(ApiType::OpenAi)
                .option(RouterOption::new().api_key("k").base_url(server.uri()))
                .option(RouterOption::new().api_key("k").base_url(format!("{}/never", server.uri()))),
        )
        .env_lookup(|_| None)
        .build()
        .unwrap();

    let signal = CancelHandle::new();
    let canceller = signal.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = runtime
        .chat(
            ChatRequest::new("gpt-4o", vec![ChatMessage::user("hi")]),
            RequestOptions::new().signal(signal),
        )
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::RequestCancelled);
}
