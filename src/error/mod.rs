//! Error Handling Module
//!
//! - Core error type (`LlmError`) and its provider-agnostic taxonomy (`ErrorKind`)
//! - HTTP status/body classification into the same taxonomy
//! - Conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use model_runtime::error::{ErrorKind, LlmError};
//!
//! let error = LlmError::rate_limited("openai", "slow down", None);
//! assert_eq!(error.kind(), ErrorKind::RateLimited);
//! assert!(error.is_retryable());
//! ```

mod classify;
mod conversions;
pub mod types;

pub use classify::*;
pub use types::*;
