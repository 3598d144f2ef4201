//! Per-request stream scratch state.
//!
//! One `StreamContext` is created per `chat()` call, passed explicitly to
//! every transformer invocation and dropped with the stream.

use std::collections::BTreeMap;

use crate::types::Usage;

/// `(id, index, name)` first seen for a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSlot {
    pub id: String,
    pub index: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct StreamContext {
    /// Stream id used for every emitted chunk.
    pub id: String,
    /// Currently inside an inline `<think>` span.
    pub thinking_in_content: bool,
    /// A grounding chunk was already emitted.
    pub returned_citation: bool,
    /// Most recent tool call (providers that stream one call at a time).
    pub tool: Option<ToolSlot>,
    /// Tool calls by positional index.
    pub tools: BTreeMap<u32, ToolSlot>,
    /// Partial usage carried between events (Anthropic `message_start`).
    pub usage: Option<Usage>,
    /// Anthropic content block types by block index.
    pub block_types: BTreeMap<u32, String>,
}

impl StreamContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Context with a random id, used until the provider reveals its own.
    pub fn generated() -> Self {
        Self::new(format!("chat_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Adopt the provider's stream id if one is present.
    pub fn adopt_id(&mut self, id: Option<&str>) {
        if let Some(id) = id.filter(|s| !s.trim().is_empty()) {
            self.id = id.to_string();
        }
    }

    pub fn register_tool(&mut self, slot: ToolSlot) {
        self.tool = Some(slot.clone());
        self.tools.insert(slot.index, slot);
    }

    pub fn tool_at(&self, index: u32) -> Option<&ToolSlot> {
        self.tools.get(&index)
    }
}
