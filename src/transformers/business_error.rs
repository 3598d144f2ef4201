//! Business errors embedded in otherwise-successful bodies.
//!
//! Several gateways answer HTTP 200 and put the failure inside the stream
//! (an `error` object, a non-zero `base_resp.status_code`, or a non-zero
//! top-level `code`). Detection runs before any content interpretation.
//! Rules are tried in order; the first match wins.

use serde_json::Value;

use crate::error::{
    ErrorKind, kind_for_code, kind_for_message, kind_for_numeric_code, kind_for_status,
};
use crate::streaming::ChunkError;

/// What a rule pulled out of a chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedError {
    pub code: Option<String>,
    pub numeric_code: Option<i64>,
    pub message: String,
}

impl EmbeddedError {
    /// Resolve the taxonomy kind: code, numeric code (vendor table, then
    /// HTTP status), message, then the generic business kind.
    pub fn kind(&self) -> ErrorKind {
        self.code
            .as_deref()
            .and_then(kind_for_code)
            .or_else(|| self.numeric_code.and_then(kind_for_numeric_code))
            .or_else(|| {
                self.numeric_code
                    .and_then(|n| u16::try_from(n).ok())
                    .and_then(kind_for_status)
            })
            .or_else(|| kind_for_message(&self.message))
            .unwrap_or(ErrorKind::ProviderBusinessError)
    }
}

pub struct EmbeddedErrorRule {
    pub name: &'static str,
    pub detect: fn(&Value) -> Option<EmbeddedError>,
}

pub const EMBEDDED_ERROR_RULES: &[EmbeddedErrorRule] = &[
    EmbeddedErrorRule {
        name: "error_object",
        detect: error_object,
    },
    EmbeddedErrorRule {
        name: "base_resp",
        detect: base_resp,
    },
    EmbeddedErrorRule {
        name: "nested_code",
        detect: nested_code,
    },
];

/// Run the rule table against a raw chunk.
pub fn detect_embedded_error(provider: &str, raw: &Value) -> Option<ChunkError> {
    EMBEDDED_ERROR_RULES.iter().find_map(|rule| {
        let found = (rule.detect)(raw)?;
        tracing::debug!(provider, rule = rule.name, message = %found.message, "embedded error");
        Some(ChunkError {
            kind: found.kind(),
            message: found.message,
            provider: Some(provider.to_string()),
            raw: Some(raw.clone()),
        })
    })
}

fn message_of(value: &Value) -> Option<String> {
    ["message", "msg", "status_msg", "error_msg"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// `{"error": {...}}` or `{"error": "..."}`. Covers OpenAI-style bodies,
/// Anthropic `error` events and Google `status` errors.
fn error_object(raw: &Value) -> Option<EmbeddedError> {
    let error = raw.get("error")?;
    match error {
        Value::Null => None,
        Value::String(message) => Some(EmbeddedError {
            message: message.clone(),
            ..Default::default()
        }),
        Value::Object(_) => {
            let code = error
                .get("code")
                .and_then(|c| c.as_str().map(str::to_string))
                .or_else(|| error.get("type").and_then(Value::as_str).map(str::to_string))
                .or_else(|| error.get("status").and_then(Value::as_str).map(str::to_string));
            let numeric_code = error.get("code").and_then(Value::as_i64);
            Some(EmbeddedError {
                code,
                numeric_code,
                message: message_of(error).unwrap_or_else(|| error.to_string()),
            })
        }
        _ => None,
    }
}

/// MiniMax: `{"base_resp": {"status_code": 1008, "status_msg": "..."}}`.
fn base_resp(raw: &Value) -> Option<EmbeddedError> {
    let resp = raw.get("base_resp")?;
    let status = resp.get("status_code").and_then(Value::as_i64)?;
    if status == 0 {
        return None;
    }
    Some(EmbeddedError {
        code: None,
        numeric_code: Some(status),
        message: message_of(resp).unwrap_or_else(|| format!("status_code {status}")),
    })
}

/// Gateway envelopes: `{"code": 500, "msg": "..."}` with no choices.
fn nested_code(raw: &Value) -> Option<EmbeddedError> {
    if raw.get("choices").is_some() {
        return None;
    }
    let code = raw.get("code")?;
    let (code, numeric_code) = match code {
        Value::Number(n) => {
            let n = n.as_i64()?;
            if n == 0 || n == 200 {
                return None;
            }
            (None, Some(n))
        }
        Value::String(s) if !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("success") => {
            (Some(s.clone()), s.parse::<i64>().ok())
        }
        _ => return None,
    };
    let message = message_of(raw)?;
    Some(EmbeddedError {
        code,
        numeric_code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_object_maps_code() {
        let raw = json!({"error": {"code": "insufficient_quota", "message": "no money"}});
        let err = detect_embedded_error("openai", &raw).unwrap();
        assert_eq!(err.kind, ErrorKind::InsufficientQuota);
        assert_eq!(err.message, "no money");
        assert_eq!(err.raw.as_ref(), Some(&raw));
    }

    #[test]
    fn base_resp_non_zero_is_error() {
        let raw = json!({"base_resp": {"status_code": 1008, "status_msg": "insufficient balance"}});
        let err = detect_embedded_error("minimax", &raw).unwrap();
        assert_eq!(err.kind, ErrorKind::InsufficientQuota);

        let ok = json!({"base_resp": {"status_code": 0, "status_msg": "success"}, "choices": []});
        assert!(detect_embedded_error("minimax", &ok).is_none());
    }

    #[test]
    fn nested_code_with_message() {
        let raw = json!({"code": 429, "msg": "Rate limit reached"});
        let err = detect_embedded_error("gateway", &raw).unwrap();
        assert_eq!(err.kind, ErrorKind::RateLimited);

        let unknown = json!({"code": "E1001", "message": "upstream exploded"});
        assert_eq!(
            detect_embedded_error("gateway", &unknown).unwrap().kind,
            ErrorKind::ProviderBusinessError
        );
    }

    #[test]
    fn http_style_numeric_codes_map_to_kinds() {
        let cases = [
            (json!({"error": {"code": 401, "message": "token expired"}}), ErrorKind::InvalidCredential),
            (json!({"code": 401, "msg": "token expired"}), ErrorKind::InvalidCredential),
            (json!({"code": 402, "msg": "arrears"}), ErrorKind::InsufficientQuota),
            (json!({"code": "403", "msg": "forbidden region"}), ErrorKind::PermissionDenied),
            (json!({"error": {"code": 429, "message": "slow down please"}}), ErrorKind::RateLimited),
        ];
        for (raw, expected) in cases {
            let err = detect_embedded_error("gateway", &raw).unwrap();
            assert_eq!(err.kind, expected, "{raw}");
        }

        let unmapped = json!({"code": 500, "msg": "upstream exploded"});
        assert_eq!(
            detect_embedded_error("gateway", &unmapped).unwrap().kind,
            ErrorKind::ProviderBusinessError
        );
    }

    #[test]
    fn normal_chunks_pass() {
        let raw = json!({"id": "x", "choices": [{"delta": {"content": "hi"}}], "error": null});
        assert!(detect_embedded_error("openai", &raw).is_none());
    }
}
