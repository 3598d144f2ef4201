//! Normalizer behaviour over recorded provider streams

use std::sync::Arc;

use futures_util::StreamExt;
use model_runtime::error::ErrorKind;
use model_runtime::providers::anthropic::replay::replay_message;
use model_runtime::streaming::{
    ChunkData, FinishReason, PipelineOptions, StreamContext, finish_stream, normalize_values,
};
use model_runtime::transformers::anthropic::AnthropicStreamTransformer;
use model_runtime::transformers::google::GoogleStreamTransformer;
use model_runtime::transformers::openai::OpenAiStreamTransformer;
use model_runtime::types::ToolCall;

#[path = "support/stream_fixture.rs"]
mod support;

#[tokio::test]
async fn openai_think_tags_tool_fragments_and_trailing_usage() {
    let chunks = support::normalize_fixture(
        "tests/fixtures/openai/think_tool_usage.sse",
        Arc::new(OpenAiStreamTransformer::new("deepseek")),
    )
    .await;

    assert_eq!(
        support::event_types(&chunks),
        vec!["text", "reasoning", "text", "tool_calls", "tool_calls", "tool_calls", "usage", "stop"]
    );
    assert!(chunks.iter().all(|c| c.id == "chatcmpl-1"));

    let content = support::canonical(&chunks);
    assert_eq!(content.text, "beforeafter");
    assert_eq!(content.reasoning, "mid");
    assert_eq!(content.tool_calls, vec![ToolCall::new("a", "f", "{\"x\":1}")]);

    match &chunks[6].data {
        ChunkData::Usage(usage) => assert_eq!(usage.total_tokens, 21),
        other => panic!("expected usage, got {other:?}"),
    }
    assert_eq!(chunks[7].data, ChunkData::Stop(FinishReason::ToolCalls));
}

#[tokio::test]
async fn repeated_citations_emit_one_grounding_chunk() {
    let chunks = support::normalize_fixture(
        "tests/fixtures/openai/citations_repeated.sse",
        Arc::new(OpenAiStreamTransformer::new("perplexity")),
    )
    .await;

    let groundings: Vec<_> = chunks
        .iter()
        .filter_map(|c| match &c.data {
            ChunkData::Grounding(g) => Some(g),
            _ => None,
        })
        .collect();
    assert_eq!(groundings.len(), 1);
    assert_eq!(groundings[0].citations.len(), 2);
    assert_eq!(support::canonical(&chunks).text, "Paris is sunny.");
}

#[tokio::test]
async fn google_grounding_thoughts_and_usage() {
    let chunks = support::normalize_fixture(
        "tests/fixtures/google/grounded_answer.sse",
        Arc::new(GoogleStreamTransformer::default()),
    )
    .await;

    let content = support::canonical(&chunks);
    assert_eq!(content.reasoning, "Thinking about sources");
    assert_eq!(content.text, "Paris is sunny.");

    let grounding_count = chunks
        .iter()
        .filter(|c| matches!(c.data, ChunkData::Grounding(_)))
        .count();
    assert_eq!(grounding_count, 1);

    let types = support::event_types(&chunks);
    assert_eq!(&types[types.len() - 2..], &["usage", "stop"]);
    match &chunks[chunks.len() - 2].data {
        ChunkData::Usage(usage) => {
            assert_eq!(usage.reasoning_tokens, Some(3));
            assert_eq!(usage.total_tokens, 12);
        }
        other => panic!("expected usage, got {other:?}"),
    }
}

#[tokio::test]
async fn anthropic_replay_matches_streamed_content() {
    let streamed = support::normalize_fixture(
        "tests/fixtures/anthropic/thinking_tool_use.sse",
        Arc::new(AnthropicStreamTransformer::default()),
    )
    .await;

    let message: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string("tests/fixtures/anthropic/thinking_tool_use.json").unwrap(),
    )
    .unwrap();
    let replayed: Vec<_> = normalize_values(
        replay_message(&message).unwrap(),
        Arc::new(AnthropicStreamTransformer::default()),
        StreamContext::new("replay"),
    )
    .collect()
    .await;

    let expected = support::canonical(&streamed);
    assert_eq!(expected.text, "Checking Paris.");
    assert_eq!(expected.reasoning, "Need the weather.");
    assert_eq!(
        expected.tool_calls,
        vec![ToolCall::new("toolu_01", "get_weather", "{\"city\":\"Paris\"}")]
    );
    assert_eq!(support::canonical(&replayed), expected);

    let usage = |chunks: &[model_runtime::streaming::StreamChunk]| {
        chunks.iter().find_map(|c| match &c.data {
            ChunkData::Usage(u) => Some((u.prompt_tokens, u.completion_tokens)),
            _ => None,
        })
    };
    assert_eq!(usage(&streamed), Some((25, 42)));
    assert_eq!(usage(&replayed), usage(&streamed));
    assert_eq!(streamed.last().unwrap().data, ChunkData::Stop(FinishReason::ToolCalls));
    assert_eq!(replayed.last().unwrap().data, ChunkData::Stop(FinishReason::ToolCalls));
}

#[tokio::test]
async fn first_chunk_error_becomes_an_err() {
    let values = support::fixture_values("tests/fixtures/openai/first_chunk_error.sse").await;
    let stream = normalize_values(
        values,
        Arc::new(OpenAiStreamTransformer::default()),
        StreamContext::new("s"),
    );
    let err = finish_stream(stream, PipelineOptions::default(), tokio::time::Instant::now())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InsufficientQuota);
}
