//! GitHub Copilot adapter
//!
//! A GitHub token is exchanged for a short-lived Copilot bearer, cached by
//! the shared [`TokenManager`]. Calls then speak the OpenAI-compatible
//! protocol against the endpoint the exchange returned. A 401 from the API
//! invalidates the cached bearer and retries once; 429s back off per
//! [`AuthRetryPolicy`]. A token the exchange rejects is not retried.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::http::{HttpHeaderBuilder, ProviderClient, check_status};
use super::openai_compatible::OpenAiCompatibleAdapter;
use super::{ApiType, CallOptions, ProviderAdapter};
use crate::auth::{CachedToken, TokenExchanger, TokenManager};
use crate::config::ProviderSettings;
use crate::error::LlmError;
use crate::retry::AuthRetryPolicy;
use crate::streaming::ChunkStream;
use crate::types::{
    ChatRequest, EmbeddingRequest, EmbeddingResponse, ModelInfo, ObjectRequest, ObjectResponse,
};

pub const DEFAULT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";

const EDITOR_VERSION: &str = "vscode/1.95.0";
const EDITOR_PLUGIN_VERSION: &str = "copilot-chat/0.22.0";
const USER_AGENT: &str = "GitHubCopilotChat/0.22.0";
const INTEGRATION_ID: &str = "vscode-chat";

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: String,
    expires_at: i64,
    #[serde(default)]
    endpoints: Option<TokenEndpoints>,
}

#[derive(Debug, Deserialize)]
struct TokenEndpoints {
    #[serde(default)]
    api: Option<String>,
}

/// Exchanges a GitHub token for a Copilot bearer.
#[derive(Clone)]
pub struct CopilotTokenExchanger {
    http: reqwest::Client,
    token_url: String,
}

impl Default for CopilotTokenExchanger {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl CopilotTokenExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

#[async_trait]
impl TokenExchanger for CopilotTokenExchanger {
    async fn exchange(&self, credential: &str) -> Result<CachedToken, LlmError> {
        let response = self
            .http
            .get(&self.token_url)
            .header(reqwest::header::AUTHORIZATION, format!("token {credential}"))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("Editor-Version", EDITOR_VERSION)
            .header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION)
            .send()
            .await?;
        let response = check_status(response, ApiType::GithubCopilot.as_str()).await?;
        let body: TokenBody = response.json().await?;
        let expires_at = DateTime::<Utc>::from_timestamp(body.expires_at, 0).unwrap_or_else(Utc::now);
        let mut token = CachedToken::new(body.token, expires_at);
        if let Some(api) = body.endpoints.and_then(|e| e.api) {
            token = token.with_endpoint(api);
        }
        Ok(token)
    }
}

pub struct GithubCopilotAdapter {
    client: ProviderClient,
    settings: ProviderSettings,
    github_token: SecretString,
    tokens: TokenManager<CopilotTokenExchanger>,
    retry: AuthRetryPolicy,
}

impl GithubCopilotAdapter {
    pub fn from_settings(
        http: reqwest::Client,
        settings: &ProviderSettings,
        tokens: TokenManager<CopilotTokenExchanger>,
    ) -> Result<Self, LlmError> {
        let github_token = settings.api_key.clone().ok_or_else(|| {
            LlmError::ConfigurationError("github-copilot requires a GitHub token".into())
        })?;
        let base_url = settings
            .base_url
            .clone()
            .or_else(|| ApiType::GithubCopilot.default_base_url().map(str::to_string))
            .unwrap_or_default();
        let headers = copilot_headers()?.with_headers(&settings.headers)?.build();
        let client = ProviderClient::new(http, provider_id(settings), base_url, headers)
            .with_timeout(settings.timeout_secs.map(std::time::Duration::from_secs));
        Ok(Self {
            client,
            settings: settings.clone(),
            github_token,
            tokens,
            retry: AuthRetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: AuthRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// OpenAI-compatible adapter bound to the current Copilot bearer. The
    /// endpoint returned by the exchange wins over the configured base URL.
    async fn authorized(&self) -> Result<OpenAiCompatibleAdapter, LlmError> {
        let token = self.tokens.get_token(&self.github_token).await?;
        let base_url = token
            .endpoint
            .clone()
            .unwrap_or_else(|| self.client.base_url.clone());
        let headers = copilot_headers()?
            .with_bearer_auth(token.token.expose_secret())?
            .with_headers(&self.settings.headers)?
            .build();
        let client = ProviderClient::new(
            self.client.http.clone(),
            self.client.provider_id.clone(),
            base_url,
            headers,
        )
        .with_timeout(self.client.timeout);
        Ok(OpenAiCompatibleAdapter::new(client))
    }

    /// Run `op` under the auth retry policy. Token exchange failures are
    /// returned as-is: only a 401 from the API call invalidates the bearer.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, LlmError>
    where
        F: Fn(OpenAiCompatibleAdapter) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let op = &op;
        self.retry
            .execute(
                move || async move {
                    let adapter = match self.authorized().await {
                        Ok(adapter) => adapter,
                        Err(error) => return Ok(Err(error)),
                    };
                    op(adapter).await.map(Ok::<T, LlmError>)
                },
                || self.drop_token(),
            )
            .await?
    }

    async fn drop_token(&self) {
        tracing::debug!("invalidating copilot token after 401");
        self.tokens.invalidate_credential(&self.github_token).await;
    }
}

fn provider_id(settings: &ProviderSettings) -> String {
    settings
        .provider_id
        .clone()
        .unwrap_or_else(|| ApiType::GithubCopilot.as_str().to_string())
}

fn copilot_headers() -> Result<HttpHeaderBuilder, LlmError> {
    HttpHeaderBuilder::new()
        .with_json_content_type()
        .with_header("User-Agent", USER_AGENT)
        .and_then(|h| h.with_header("Editor-Version", EDITOR_VERSION))
        .and_then(|h| h.with_header("Editor-Plugin-Version", EDITOR_PLUGIN_VERSION))
        .and_then(|h| h.with_header("Copilot-Integration-Id", INTEGRATION_ID))
        .and_then(|h| h.with_header("Openai-Intent", "conversation-panel"))
}

#[async_trait]
impl ProviderAdapter for GithubCopilotAdapter {
    fn provider_id(&self) -> &str {
        &self.client.provider_id
    }

    fn client(&self) -> &ProviderClient {
        &self.client
    }

    async fn chat(
        &self,
        request: &ChatRequest,
        options: &CallOptions,
    ) -> Result<ChunkStream, LlmError> {
        self.call(|adapter| async move { adapter.chat(request, options).await })
            .await
    }

    async fn embeddings(
        &self,
        request: &EmbeddingRequest,
        options: &CallOptions,
    ) -> Result<EmbeddingResponse, LlmError> {
        self.call(|adapter| async move { adapter.embeddings(request, options).await })
            .await
    }

    async fn generate_object(
        &self,
        request: &ObjectRequest,
        options: &CallOptions,
    ) -> Result<ObjectResponse, LlmError> {
        self.call(|adapter| async move { adapter.generate_object(request, options).await })
            .await
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        self.call(|adapter| async move { adapter.models().await }).await
    }
}
