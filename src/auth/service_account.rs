//! Service-account credentials for Vertex AI.
//!
//! Implements the OAuth 2.0 JWT Bearer grant: the service-account JSON is
//! the long-lived credential, the access token is cached by the
//! [`TokenManager`](super::TokenManager) under the JSON's fingerprint.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::token_manager::{CachedToken, TokenExchanger};
use crate::error::{LlmError, classify_http_error};
use crate::retry::{RetryExecutor, RetryPolicy};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Service account JSON subset needed for the JWT flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccountCredentials {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ServiceAccountCredentials {
    pub fn from_json(json: &str) -> Result<Self, LlmError> {
        serde_json::from_str::<Self>(json)
            .map_err(|e| LlmError::ConfigurationError(format!("Invalid service account JSON: {e}")))
    }

    fn scope(&self) -> String {
        if self.scopes.is_empty() {
            DEFAULT_SCOPE.to_string()
        } else {
            self.scopes.join(" ")
        }
    }

    fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Exchanges a service-account JSON blob for an access token.
#[derive(Clone, Default)]
pub struct ServiceAccountExchanger {
    http: reqwest::Client,
    assertion_override: Option<String>,
}

impl ServiceAccountExchanger {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            assertion_override: None,
        }
    }

    /// Skip signing and send a prebuilt assertion (tests).
    pub fn with_assertion_override(mut self, assertion: impl Into<String>) -> Self {
        self.assertion_override = Some(assertion.into());
        self
    }

    fn assertion(&self, creds: &ServiceAccountCredentials) -> Result<String, LlmError> {
        if let Some(assertion) = &self.assertion_override {
            return Ok(assertion.clone());
        }
        use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &creds.client_email,
            scope: creds.scope(),
            aud: creds.token_uri(),
            iat: now,
            exp: now + 3600,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some("JWT".to_string());
        let key = EncodingKey::from_rsa_pem(creds.private_key.as_bytes()).map_err(|e| {
            LlmError::ConfigurationError(format!("Invalid RSA private key (PEM): {e}"))
        })?;
        encode(&header, &claims, &key)
            .map_err(|e| LlmError::ConfigurationError(format!("Failed to sign JWT: {e}")))
    }

    async fn request_token(
        &self,
        creds: &ServiceAccountCredentials,
        assertion: &str,
    ) -> Result<CachedToken, LlmError> {
        let form = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion),
        ];
        let response = self.http.post(creds.token_uri()).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_error("vertexai", status.as_u16(), &headers, &body));
        }
        let token: TokenResponse = response.json().await?;
        Ok(CachedToken::new(
            token.access_token,
            Utc::now() + chrono::Duration::seconds(token.expires_in),
        ))
    }
}

#[async_trait]
impl TokenExchanger for ServiceAccountExchanger {
    async fn exchange(&self, credential: &str) -> Result<CachedToken, LlmError> {
        let creds = ServiceAccountCredentials::from_json(credential)?;
        let assertion = self.assertion(&creds)?;
        tracing::debug!(client_email = %creds.client_email, "exchanging service account assertion");
        RetryExecutor::new(RetryPolicy::new().with_max_attempts(2))
            .execute(|| self.request_token(&creds, &assertion))
            .await
    }
}
