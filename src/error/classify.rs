//! HTTP / business error classification.
//!
//! Maps HTTP status codes, provider error codes and error messages onto
//! [`ErrorKind`]. The same tables are used for errors embedded in
//! otherwise-successful stream bodies.

use super::types::{ErrorKind, LlmError};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Provider error codes (string form) and the kind they map to.
const CODE_RULES: &[(&str, ErrorKind)] = &[
    ("invalid_api_key", ErrorKind::InvalidCredential),
    ("authentication_error", ErrorKind::InvalidCredential),
    ("unauthorized", ErrorKind::InvalidCredential),
    ("permission_error", ErrorKind::PermissionDenied),
    ("permission_denied", ErrorKind::PermissionDenied),
    ("insufficient_quota", ErrorKind::InsufficientQuota),
    ("insufficient_balance", ErrorKind::InsufficientQuota),
    ("billing_hard_limit_reached", ErrorKind::InsufficientQuota),
    ("rate_limit_exceeded", ErrorKind::RateLimited),
    ("rate_limit_error", ErrorKind::RateLimited),
    ("resource_exhausted", ErrorKind::RateLimited),
    ("overloaded_error", ErrorKind::RateLimited),
    ("context_length_exceeded", ErrorKind::ContextWindowExceeded),
    ("string_above_max_length", ErrorKind::ContextWindowExceeded),
];

/// Message fragments (lowercase) and the kind they indicate.
const MESSAGE_RULES: &[(&str, ErrorKind)] = &[
    ("invalid api key", ErrorKind::InvalidCredential),
    ("incorrect api key", ErrorKind::InvalidCredential),
    ("api key not valid", ErrorKind::InvalidCredential),
    ("insufficient balance", ErrorKind::InsufficientQuota),
    ("insufficient_quota", ErrorKind::InsufficientQuota),
    ("exceeded your current quota", ErrorKind::InsufficientQuota),
    ("rate limit", ErrorKind::RateLimited),
    ("too many requests", ErrorKind::RateLimited),
    ("context length", ErrorKind::ContextWindowExceeded),
    ("context window", ErrorKind::ContextWindowExceeded),
    ("maximum context", ErrorKind::ContextWindowExceeded),
    ("prompt is too long", ErrorKind::ContextWindowExceeded),
    ("token limit", ErrorKind::ContextWindowExceeded),
];

/// MiniMax-style numeric `base_resp.status_code` values.
const NUMERIC_CODE_RULES: &[(i64, ErrorKind)] = &[
    (1002, ErrorKind::RateLimited),
    (1004, ErrorKind::InvalidCredential),
    (1008, ErrorKind::InsufficientQuota),
    (1039, ErrorKind::ContextWindowExceeded),
    (2049, ErrorKind::InvalidCredential),
];

pub fn kind_for_code(code: &str) -> Option<ErrorKind> {
    let code = code.to_ascii_lowercase();
    CODE_RULES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, kind)| *kind)
}

pub fn kind_for_numeric_code(code: i64) -> Option<ErrorKind> {
    NUMERIC_CODE_RULES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, kind)| *kind)
}

pub fn kind_for_message(message: &str) -> Option<ErrorKind> {
    let lower = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(fragment, _)| lower.contains(fragment))
        .map(|(_, kind)| *kind)
}

pub fn kind_for_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 => Some(ErrorKind::InvalidCredential),
        403 => Some(ErrorKind::PermissionDenied),
        402 => Some(ErrorKind::InsufficientQuota),
        413 => Some(ErrorKind::ContextWindowExceeded),
        429 => Some(ErrorKind::RateLimited),
        _ => None,
    }
}

/// Parse a `Retry-After` header (delta-seconds form).
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date form
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    delta.to_std().ok()
}

/// Pull `(code, message)` out of the common error body shapes:
/// `{"error":{"code"|"type","message"}}`, `{"error":"..."}`, `{"message": ...}`.
pub fn extract_error_fields(body: &serde_json::Value) -> (Option<String>, Option<String>) {
    let err = body.get("error").unwrap_or(body);
    if let Some(s) = err.as_str() {
        return (None, Some(s.to_string()));
    }
    let code = err
        .get("code")
        .and_then(|c| {
            c.as_str()
                .map(str::to_string)
                .or_else(|| c.as_i64().map(|n| n.to_string()))
        })
        .or_else(|| err.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .or_else(|| err.get("status").and_then(|t| t.as_str()).map(str::to_string));
    let message = err
        .get("message")
        .or_else(|| err.get("msg"))
        .and_then(|m| m.as_str())
        .map(str::to_string);
    (code, message)
}

/// Classify a failed HTTP response into the runtime taxonomy.
pub fn classify_http_error(
    provider: &str,
    status: u16,
    headers: &HeaderMap,
    body: &str,
) -> LlmError {
    let json = serde_json::from_str::<serde_json::Value>(body).ok();
    let (code, message) = json
        .as_ref()
        .map(extract_error_fields)
        .unwrap_or((None, None));
    let message = message.unwrap_or_else(|| {
        if body.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            body.to_string()
        }
    });

    // Code and message beat status: 429 + insufficient_quota is a billing
    // problem, not a transient rate limit.
    let kind = code
        .as_deref()
        .and_then(kind_for_code)
        .or_else(|| kind_for_message(&message))
        .or_else(|| kind_for_status(status));

    match kind {
        Some(ErrorKind::RateLimited) => {
            LlmError::rate_limited(provider, message, parse_retry_after(headers))
        }
        Some(kind) => LlmError::from_kind(kind, provider, message),
        None => LlmError::business(provider, Some(status), message, json),
    }
}
