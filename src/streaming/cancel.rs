//! Cancellation utilities
//!
//! A caller-held [`CancelHandle`] aborts an in-flight request. While the
//! request handshake is pending the future is dropped (closing the
//! connection) and `LlmError::RequestCancelled` is returned. Once streaming,
//! the stream closes gracefully: a `stop(cancelled)` chunk is emitted when
//! content was already delivered, otherwise the stream simply ends.

use futures::StreamExt;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use super::chunk::{ChunkStream, FinishReason, StreamChunk};
use crate::error::LlmError;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Dropping the cancelled stream closes the
    /// underlying HTTP connection so providers stop generating tokens.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

/// Race `future` against the cancel signal.
pub async fn run_cancellable<F, T>(signal: Option<&CancelHandle>, future: F) -> Result<T, LlmError>
where
    F: Future<Output = Result<T, LlmError>>,
{
    let Some(signal) = signal else {
        return future.await;
    };
    if signal.is_cancelled() {
        return Err(LlmError::RequestCancelled);
    }
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(LlmError::RequestCancelled),
        result = future => result,
    }
}

/// Wrap a chunk stream so that cancellation closes it gracefully.
pub fn make_cancellable(stream: ChunkStream, signal: CancelHandle) -> ChunkStream {
    let mut inner = stream;
    let s = async_stream::stream! {
        let mut emitted_content = false;
        let mut last_id: Option<String> = None;
        loop {
            tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    if emitted_content {
                        let id = last_id.take().unwrap_or_default();
                        yield StreamChunk::stop(id, FinishReason::Cancelled);
                    }
                    tracing::debug!(emitted_content, "stream cancelled by caller");
                    break;
                }
                item = inner.next() => {
                    let Some(chunk) = item else { break };
                    emitted_content |= chunk.is_content();
                    last_id = Some(chunk.id.clone());
                    yield chunk;
                }
            }
        }
    };
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::ChunkData;
    use std::time::Duration;

    fn slow_stream() -> ChunkStream {
        Box::pin(async_stream::stream! {
            yield StreamChunk::text("s1", "hello");
            tokio::time::sleep(Duration::from_secs(60)).await;
            yield StreamChunk::text("s1", "never");
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_content_yields_cancelled_stop() {
        let handle = CancelHandle::new();
        let mut stream = make_cancellable(slow_stream(), handle.clone());

        let first = stream.next().await.unwrap();
        assert_eq!(first.data, ChunkData::Text("hello".into()));

        handle.cancel();
        let marker = stream.next().await.unwrap();
        assert_eq!(marker.data, ChunkData::Stop(FinishReason::Cancelled));
        assert_eq!(marker.id, "s1");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_content_just_ends() {
        let handle = CancelHandle::new();
        handle.cancel();
        let mut stream = make_cancellable(slow_stream(), handle);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_handshake_returns_request_cancelled() {
        let handle = CancelHandle::new();
        handle.cancel();
        let result: Result<(), LlmError> =
            run_cancellable(Some(&handle), async { Ok(()) }).await;
        assert!(matches!(result, Err(LlmError::RequestCancelled)));
    }
}
