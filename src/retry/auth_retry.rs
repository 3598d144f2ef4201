//! Adapter-level retry for token-exchange providers.
//!
//! Three independent bounds apply at once:
//! - `max_attempts`: hard cap on calls to the operation
//! - `max_auth_refreshes`: how many times a 401 may invalidate the token
//!   and retry (a second 401 after a fresh token is a credential problem)
//! - `max_rate_limit_retries`: retries after 429, waiting `Retry-After` when
//!   given, otherwise exponential backoff, never longer than `max_delay`

use std::future::Future;
use std::time::Duration;

use super::policy::RetryPolicy;
use crate::error::{ErrorKind, LlmError};

#[derive(Debug, Clone)]
pub struct AuthRetryPolicy {
    pub max_attempts: u32,
    pub max_auth_refreshes: u32,
    pub max_rate_limit_retries: u32,
    pub backoff: RetryPolicy,
}

impl Default for AuthRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            max_auth_refreshes: 1,
            max_rate_limit_retries: 2,
            backoff: RetryPolicy::new()
                .with_initial_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(30)),
        }
    }
}

impl AuthRetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub const fn with_max_auth_refreshes(mut self, n: u32) -> Self {
        self.max_auth_refreshes = n;
        self
    }

    pub const fn with_max_rate_limit_retries(mut self, n: u32) -> Self {
        self.max_rate_limit_retries = n;
        self
    }

    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run `operation`; on an authentication failure `refresh` is awaited
    /// (typically token invalidation) before the next attempt.
    pub async fn execute<Op, OpFut, Refresh, RefreshFut, T>(
        &self,
        mut operation: Op,
        mut refresh: Refresh,
    ) -> Result<T, LlmError>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T, LlmError>>,
        Refresh: FnMut() -> RefreshFut,
        RefreshFut: Future<Output = ()>,
    {
        let mut auth_refreshes = 0;
        let mut rate_limit_retries = 0;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= self.max_attempts {
                return Err(error);
            }
            match error.kind() {
                ErrorKind::InvalidCredential if auth_refreshes < self.max_auth_refreshes => {
                    auth_refreshes += 1;
                    tracing::debug!(attempt, auth_refreshes, "refreshing credential after 401");
                    refresh().await;
                }
                ErrorKind::RateLimited if rate_limit_retries < self.max_rate_limit_retries => {
                    let delay = self.backoff.delay_for(&error, rate_limit_retries);
                    rate_limit_retries += 1;
                    tracing::debug!(
                        attempt,
                        rate_limit_retries,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => return Err(error),
            }
        }
    }
}
