//! Retry module
//! - policy.rs: generic exponential backoff with jitter
//! - auth_retry.rs: 401/429-aware retry for token-exchange adapters

pub mod auth_retry;
pub mod policy;

pub use auth_retry::AuthRetryPolicy;
pub use policy::{RetryExecutor, RetryPolicy};
