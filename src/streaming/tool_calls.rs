//! Tool-call delta accumulation.
//!
//! Fragments are keyed by their positional index; the id is only used to
//! detect a new call reusing an index (some gateways restart indexes per
//! choice).

use super::chunk::ToolCallDelta;
use crate::types::ToolCall;

#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PendingCall>,
}

#[derive(Debug, Clone)]
struct PendingCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ToolCallDelta) {
        let existing = self.calls.iter_mut().rev().find(|c| {
            c.index == delta.index && (delta.id.is_empty() || c.id.is_empty() || c.id == delta.id)
        });
        match existing {
            Some(call) => {
                if call.id.is_empty() {
                    call.id = delta.id.clone();
                }
                if call.name.is_empty()
                    && let Some(name) = &delta.name
                {
                    call.name = name.clone();
                }
                call.arguments.push_str(&delta.arguments);
            }
            None => self.calls.push(PendingCall {
                index: delta.index,
                id: delta.id.clone(),
                name: delta.name.clone().unwrap_or_default(),
                arguments: delta.arguments.clone(),
            }),
        }
    }

    pub fn extend<'a>(&mut self, deltas: impl IntoIterator<Item = &'a ToolCallDelta>) {
        for d in deltas {
            self.push(d);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Accumulated calls in first-seen order.
    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls
            .iter()
            .map(|c| ToolCall::new(c.id.clone(), c.name.clone(), c.arguments.clone()))
            .collect()
    }
}
