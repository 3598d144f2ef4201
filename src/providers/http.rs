//! HTTP plumbing shared by every adapter.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{LlmError, classify_http_error};
use crate::streaming::{CancelHandle, run_cancellable};

/// Header builder for provider requests.
#[derive(Debug, Default)]
pub struct HttpHeaderBuilder {
    headers: HeaderMap,
}

impl HttpHeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bearer_auth(self, token: &str) -> Result<Self, LlmError> {
        self.with_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    pub fn with_json_content_type(mut self) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, LlmError> {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            LlmError::ConfigurationError(format!("Invalid header name '{name}': {e}"))
        })?;
        let mut header_value = HeaderValue::from_str(value).map_err(|e| {
            LlmError::ConfigurationError(format!("Invalid header value for '{name}': {e}"))
        })?;
        if header_name == AUTHORIZATION || name.eq_ignore_ascii_case("x-api-key") {
            header_value.set_sensitive(true);
        }
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Custom headers are applied last and override anything set before.
    pub fn with_headers(mut self, headers: &BTreeMap<String, String>) -> Result<Self, LlmError> {
        for (name, value) in headers {
            self = self.with_header(name, value)?;
        }
        Ok(self)
    }

    pub fn build(self) -> HeaderMap {
        self.headers
    }
}

/// A configured HTTP client for one provider endpoint.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    pub http: reqwest::Client,
    pub base_url: String,
    pub headers: HeaderMap,
    pub provider_id: String,
    pub timeout: Option<Duration>,
}

impl ProviderClient {
    pub fn new(
        http: reqwest::Client,
        provider_id: impl Into<String>,
        base_url: impl Into<String>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers,
            provider_id: provider_id.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `path` is appended to the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Build a request with the client headers plus per-call `extra` headers.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        extra: &BTreeMap<String, String>,
    ) -> Result<RequestBuilder, LlmError> {
        let mut headers = self.headers.clone();
        headers.extend(HttpHeaderBuilder::new().with_headers(extra)?.build());
        let mut builder = self.http.request(method, self.url(path)).headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    /// POST a JSON body and return the successful response.
    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        extra: &BTreeMap<String, String>,
        signal: Option<&CancelHandle>,
    ) -> Result<Response, LlmError> {
        let builder = self.request(Method::POST, path, extra)?.json(body);
        send(builder, &self.provider_id, signal).await
    }

    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, LlmError> {
        let builder = self.request(Method::GET, path, &BTreeMap::new())?;
        let response = send(builder, &self.provider_id, None).await?;
        Ok(response.json().await?)
    }
}

/// Send a request raced against `signal`; non-2xx statuses are classified
/// into `LlmError`.
pub async fn send(
    builder: RequestBuilder,
    provider: &str,
    signal: Option<&CancelHandle>,
) -> Result<Response, LlmError> {
    let response = run_cancellable(signal, async { Ok(builder.send().await?) }).await?;
    check_status(response, provider).await
}

pub async fn check_status(response: Response, provider: &str) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(provider, status = status.as_u16(), body = %body, "provider returned error status");
    Err(classify_http_error(provider, status.as_u16(), &headers, &body))
}
