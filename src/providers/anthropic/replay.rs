//! Replay a non-streaming Messages API response as stream events.
//!
//! The event sequence is `message_start`, then `content_block_start`,
//! `content_block_delta`* and `content_block_stop` per block, then
//! `message_delta` and `message_stop`. Feeding it through the streaming
//! transformer yields the same canonical chunks a streamed response would.

use serde_json::{Value, json};

use crate::error::LlmError;

pub fn replay_message(message: &Value) -> Result<Vec<Value>, LlmError> {
    let id = message
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::StreamParseError("message without id".into()))?;
    let usage = message.get("usage").cloned().unwrap_or_else(|| json!({}));
    let mut start_usage = usage.clone();
    if let Some(obj) = start_usage.as_object_mut() {
        obj.insert("output_tokens".into(), json!(0));
    }

    let mut events = vec![json!({
        "type": "message_start",
        "message": {
            "id": id,
            "type": "message",
            "role": message.get("role").cloned().unwrap_or_else(|| json!("assistant")),
            "model": message.get("model").cloned().unwrap_or(Value::Null),
            "content": [],
            "stop_reason": null,
            "stop_sequence": null,
            "usage": start_usage,
        }
    })];

    let blocks = message
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (index, block) in blocks.iter().enumerate() {
        replay_block(index, block, &mut events);
    }

    events.push(json!({
        "type": "message_delta",
        "delta": {
            "stop_reason": message.get("stop_reason").cloned().unwrap_or(Value::Null),
            "stop_sequence": message.get("stop_sequence").cloned().unwrap_or(Value::Null),
        },
        "usage": {"output_tokens": usage.get("output_tokens").cloned().unwrap_or(json!(0))},
    }));
    events.push(json!({"type": "message_stop"}));
    Ok(events)
}

fn replay_block(index: usize, block: &Value, events: &mut Vec<Value>) {
    let block_type = block.get("type").and_then(Value::as_str).unwrap_or("text");
    let field = |name: &str| block.get(name).cloned().unwrap_or(Value::Null);
    let delta = |delta: Value| json!({"type": "content_block_delta", "index": index, "delta": delta});

    match block_type {
        "text" => {
            events.push(block_start(index, json!({"type": "text", "text": ""})));
            events.push(delta(json!({"type": "text_delta", "text": field("text")})));
        }
        "thinking" => {
            events.push(block_start(index, json!({"type": "thinking", "thinking": ""})));
            events.push(delta(json!({"type": "thinking_delta", "thinking": field("thinking")})));
            if let Some(signature) = block.get("signature").filter(|s| !s.is_null()) {
                events.push(delta(json!({"type": "signature_delta", "signature": signature})));
            }
        }
        "tool_use" => {
            events.push(block_start(
                index,
                json!({"type": "tool_use", "id": field("id"), "name": field("name"), "input": {}}),
            ));
            let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
            events.push(delta(
                json!({"type": "input_json_delta", "partial_json": input.to_string()}),
            ));
        }
        // redacted_thinking, server tool blocks and results carry their
        // payload in the start event.
        _ => events.push(block_start(index, block.clone())),
    }
    events.push(json!({"type": "content_block_stop", "index": index}));
}

fn block_start(index: usize, block: Value) -> Value {
    json!({"type": "content_block_start", "index": index, "content_block": block})
}
