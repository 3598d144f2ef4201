//! Per-attempt routing telemetry.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::LlmError;
use crate::providers::ApiType;

/// Outcome of one provider attempt inside a routed call.
#[derive(Debug, Clone)]
pub struct RouteAttemptResult {
    pub api_type: ApiType,
    pub provider_id: String,
    pub router_id: Option<String>,
    pub channel_id: Option<String>,
    pub remark: Option<String>,
    pub model: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<LlmError>,
}

/// Receives one record per attempt. Errors are logged by the runtime and
/// never fail the call.
#[async_trait]
pub trait RouteAttemptSink: Send + Sync {
    async fn record(&self, attempt: &RouteAttemptResult) -> Result<(), LlmError>;
}

/// Sink that keeps every attempt in memory.
#[derive(Debug, Default)]
pub struct MemoryAttemptSink {
    attempts: Mutex<Vec<RouteAttemptResult>>,
}

impl MemoryAttemptSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<RouteAttemptResult> {
        self.attempts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RouteAttemptSink for MemoryAttemptSink {
    async fn record(&self, attempt: &RouteAttemptResult) -> Result<(), LlmError> {
        self.attempts
            .lock()
            .map_err(|_| LlmError::InternalError("attempt log poisoned".into()))?
            .push(attempt.clone());
        Ok(())
    }
}
