//! Core error types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Provider-agnostic error kind.
///
/// Transport failures, HTTP status codes and business errors embedded in an
/// otherwise successful stream all map onto this taxonomy, so callers never
/// branch on provider specifics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCredential,
    PermissionDenied,
    InsufficientQuota,
    RateLimited,
    ContextWindowExceeded,
    ProviderBusinessError,
    StreamParseError,
    /// The router list resolved to nothing.
    EmptyProviders,
    /// The matched router has no usable option.
    EmptyProviderOptions,
    RequestCancelled,
    Network,
    Configuration,
    Unsupported,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "invalid_credential",
            Self::PermissionDenied => "permission_denied",
            Self::InsufficientQuota => "insufficient_quota",
            Self::RateLimited => "rate_limited",
            Self::ContextWindowExceeded => "context_window_exceeded",
            Self::ProviderBusinessError => "provider_business_error",
            Self::StreamParseError => "stream_parse_error",
            Self::EmptyProviders => "empty_providers",
            Self::EmptyProviderOptions => "empty_provider_options",
            Self::RequestCancelled => "request_cancelled",
            Self::Network => "network",
            Self::Configuration => "configuration",
            Self::Unsupported => "unsupported",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type of the runtime.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("Invalid credential ({provider}): {message}")]
    InvalidCredential { provider: String, message: String },

    #[error("Permission denied ({provider}): {message}")]
    PermissionDenied { provider: String, message: String },

    #[error("Insufficient quota ({provider}): {message}")]
    InsufficientQuota { provider: String, message: String },

    #[error("Rate limited ({provider}): {message}")]
    RateLimited {
        provider: String,
        message: String,
        /// Provider `Retry-After` hint, when one was sent.
        retry_after: Option<Duration>,
    },

    #[error("Context window exceeded ({provider}): {message}")]
    ContextWindowExceeded { provider: String, message: String },

    #[error("Provider error ({provider}{}): {message}", .status.map(|s| format!(", status {s}")).unwrap_or_default())]
    ProviderBusinessError {
        provider: String,
        status: Option<u16>,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Stream parse error: {0}")]
    StreamParseError(String),

    #[error("No provider router is configured for this request")]
    EmptyProviders,

    #[error("Router {} has no usable provider option", .router.as_deref().unwrap_or("<unnamed>"))]
    EmptyProviderOptions { router: Option<String> },

    #[error("Request cancelled")]
    RequestCancelled,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    pub fn invalid_credential(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCredential {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(
        provider: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            message: message.into(),
            retry_after,
        }
    }

    pub fn business(
        provider: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self::ProviderBusinessError {
            provider: provider.into(),
            status,
            message: message.into(),
            details,
        }
    }

    /// Build an error of the given kind. Kinds without a provider-scoped
    /// variant fall back to their closest infrastructure variant.
    pub fn from_kind(
        kind: ErrorKind,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let provider = provider.into();
        let message = message.into();
        match kind {
            ErrorKind::InvalidCredential => Self::InvalidCredential { provider, message },
            ErrorKind::PermissionDenied => Self::PermissionDenied { provider, message },
            ErrorKind::InsufficientQuota => Self::InsufficientQuota { provider, message },
            ErrorKind::RateLimited => Self::RateLimited {
                provider,
                message,
                retry_after: None,
            },
            ErrorKind::ContextWindowExceeded => Self::ContextWindowExceeded { provider, message },
            ErrorKind::ProviderBusinessError => Self::ProviderBusinessError {
                provider,
                status: None,
                message,
                details: None,
            },
            ErrorKind::StreamParseError => Self::StreamParseError(message),
            ErrorKind::EmptyProviders => Self::EmptyProviders,
            ErrorKind::EmptyProviderOptions => Self::EmptyProviderOptions { router: None },
            ErrorKind::RequestCancelled => Self::RequestCancelled,
            ErrorKind::Network => Self::HttpError(message),
            ErrorKind::Configuration => Self::ConfigurationError(message),
            ErrorKind::Unsupported => Self::UnsupportedOperation(message),
            ErrorKind::InvalidInput => Self::InvalidInput(message),
            ErrorKind::Internal => Self::InternalError(message),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredential { .. } => ErrorKind::InvalidCredential,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::InsufficientQuota { .. } => ErrorKind::InsufficientQuota,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::ContextWindowExceeded { .. } => ErrorKind::ContextWindowExceeded,
            Self::ProviderBusinessError { .. } => ErrorKind::ProviderBusinessError,
            Self::StreamParseError(_) => ErrorKind::StreamParseError,
            Self::EmptyProviders => ErrorKind::EmptyProviders,
            Self::EmptyProviderOptions { .. } => ErrorKind::EmptyProviderOptions,
            Self::RequestCancelled => ErrorKind::RequestCancelled,
            Self::HttpError(_) => ErrorKind::Network,
            Self::JsonError(_) => ErrorKind::StreamParseError,
            Self::ConfigurationError(_) => ErrorKind::Configuration,
            Self::UnsupportedOperation(_) => ErrorKind::Unsupported,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Whether an identical retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::HttpError(_) => true,
            Self::ProviderBusinessError { status, .. } => {
                matches!(status, Some(500..=599) | Some(408))
            }
            _ => false,
        }
    }

    /// Router-level exhaustion: nothing to retry.
    pub const fn is_router_exhaustion(&self) -> bool {
        matches!(self, Self::EmptyProviders | Self::EmptyProviderOptions { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Provider-facing message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            Self::InvalidCredential { message, .. }
            | Self::PermissionDenied { message, .. }
            | Self::InsufficientQuota { message, .. }
            | Self::RateLimited { message, .. }
            | Self::ContextWindowExceeded { message, .. }
            | Self::ProviderBusinessError { message, .. } => message.clone(),
            Self::StreamParseError(m)
            | Self::HttpError(m)
            | Self::JsonError(m)
            | Self::ConfigurationError(m)
            | Self::UnsupportedOperation(m)
            | Self::InvalidInput(m)
            | Self::InternalError(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_exhaustion_kinds_are_distinct() {
        let providers = LlmError::EmptyProviders;
        let options = LlmError::EmptyProviderOptions {
            router: Some("r1".into()),
        };
        assert_ne!(providers.kind(), options.kind());
        assert!(providers.is_router_exhaustion());
        assert!(options.is_router_exhaustion());
        assert!(options.to_string().contains("r1"));
    }

    #[test]
    fn retryability_follows_kind() {
        assert!(LlmError::rate_limited("p", "slow", None).is_retryable());
        assert!(LlmError::business("p", Some(503), "down", None).is_retryable());
        assert!(!LlmError::business("p", Some(400), "bad", None).is_retryable());
        assert!(!LlmError::invalid_credential("p", "bad key").is_retryable());
    }

    #[test]
    fn from_kind_round_trips_provider_kinds() {
        for kind in [
            ErrorKind::InvalidCredential,
            ErrorKind::PermissionDenied,
            ErrorKind::InsufficientQuota,
            ErrorKind::RateLimited,
            ErrorKind::ContextWindowExceeded,
            ErrorKind::ProviderBusinessError,
        ] {
            assert_eq!(LlmError::from_kind(kind, "p", "m").kind(), kind);
        }
    }

    #[test]
    fn business_error_display_includes_status() {
        let err = LlmError::business("minimax", Some(402), "balance", None);
        assert_eq!(err.to_string(), "Provider error (minimax, status 402): balance");
        assert_eq!(err.message(), "balance");
    }
}
