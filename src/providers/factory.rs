//! Adapter construction keyed by [`ApiType`].

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use super::{ApiType, ProviderAdapter, ProviderFamily};
use crate::config::ProviderSettings;
use crate::error::LlmError;

#[cfg(feature = "gcp")]
use crate::auth::{ServiceAccountCredentials, ServiceAccountExchanger};
#[cfg(any(feature = "gcp", feature = "github-copilot"))]
use crate::auth::TokenManager;
#[cfg(feature = "github-copilot")]
use super::github_copilot::{CopilotTokenExchanger, GithubCopilotAdapter};

/// How the merged `api_key` is interpreted.
#[derive(Clone)]
pub enum Credentials {
    None,
    Bearer(SecretString),
    /// Service-account JSON blob (Vertex AI)
    ServiceAccount(SecretString),
}

impl Credentials {
    /// `vertexai` reads a JSON object key as a service account; everything
    /// else is a bearer.
    pub fn from_settings(api_type: ApiType, settings: &ProviderSettings) -> Self {
        match &settings.api_key {
            None => Self::None,
            Some(key)
                if api_type == ApiType::VertexAi
                    && key.expose_secret().trim_start().starts_with('{') =>
            {
                Self::ServiceAccount(key.clone())
            }
            Some(key) => Self::Bearer(key.clone()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "Credentials::None",
            Self::Bearer(_) => "Credentials::Bearer(***)",
            Self::ServiceAccount(_) => "Credentials::ServiceAccount(***)",
        })
    }
}

/// Builds one adapter per attempt from fully merged settings.
pub trait AdapterFactory: Send + Sync {
    fn build(
        &self,
        api_type: ApiType,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError>;
}

/// Factory for the built-in provider families. Token caches live here, so
/// every adapter built by one factory shares them.
#[derive(Clone)]
pub struct DefaultAdapterFactory {
    http: reqwest::Client,
    #[cfg(feature = "github-copilot")]
    copilot_tokens: TokenManager<CopilotTokenExchanger>,
    #[cfg(feature = "gcp")]
    vertex_tokens: TokenManager<ServiceAccountExchanger>,
}

impl Default for DefaultAdapterFactory {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl std::fmt::Debug for DefaultAdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultAdapterFactory").finish_non_exhaustive()
    }
}

#[allow(dead_code)]
fn feature_disabled(feature: &str, api_type: ApiType) -> LlmError {
    LlmError::ConfigurationError(format!(
        "{api_type} requires the `{feature}` feature"
    ))
}

impl DefaultAdapterFactory {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            #[cfg(feature = "github-copilot")]
            copilot_tokens: TokenManager::new(CopilotTokenExchanger::new(http.clone())),
            #[cfg(feature = "gcp")]
            vertex_tokens: TokenManager::new(ServiceAccountExchanger::new(http.clone())),
            http,
        }
    }

    #[cfg(feature = "github-copilot")]
    pub fn with_copilot_exchanger(mut self, exchanger: CopilotTokenExchanger) -> Self {
        self.copilot_tokens = TokenManager::new(exchanger);
        self
    }

    #[cfg(feature = "gcp")]
    pub fn with_vertex_exchanger(mut self, exchanger: ServiceAccountExchanger) -> Self {
        self.vertex_tokens = TokenManager::new(exchanger);
        self
    }

    #[cfg(feature = "openai")]
    fn openai(
        &self,
        api_type: ApiType,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        let adapter = super::openai_compatible::OpenAiCompatibleAdapter::from_settings(
            self.http.clone(),
            api_type,
            settings,
        )?;
        Ok(Arc::new(adapter))
    }

    #[cfg(not(feature = "openai"))]
    fn openai(
        &self,
        api_type: ApiType,
        _settings: &ProviderSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        Err(feature_disabled("openai", api_type))
    }

    #[cfg(feature = "anthropic")]
    fn anthropic(&self, settings: &ProviderSettings) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        let adapter = super::anthropic::AnthropicAdapter::from_settings(self.http.clone(), settings)?;
        Ok(Arc::new(adapter))
    }

    #[cfg(not(feature = "anthropic"))]
    fn anthropic(&self, _settings: &ProviderSettings) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        Err(feature_disabled("anthropic", ApiType::Anthropic))
    }

    #[cfg(feature = "google")]
    fn google(
        &self,
        api_type: ApiType,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        use super::google::{GoogleAdapter, GoogleAuth};

        let mut project = None;
        let auth = match (Credentials::from_settings(api_type, settings), api_type) {
            (Credentials::None, _) => GoogleAuth::None,
            (Credentials::Bearer(key), ApiType::Google) => GoogleAuth::ApiKey(key),
            (Credentials::Bearer(token), _) => GoogleAuth::Bearer(token),
            (Credentials::ServiceAccount(json), _) => self.service_account(json, &mut project)?,
        };
        let adapter = GoogleAdapter::from_settings(
            self.http.clone(),
            api_type,
            settings,
            auth,
            project.as_deref(),
        )?;
        Ok(Arc::new(adapter))
    }

    #[cfg(not(feature = "google"))]
    fn google(
        &self,
        api_type: ApiType,
        _settings: &ProviderSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        Err(feature_disabled("google", api_type))
    }

    #[cfg(feature = "gcp")]
    fn service_account(
        &self,
        json: SecretString,
        project: &mut Option<String>,
    ) -> Result<super::google::GoogleAuth, LlmError> {
        let parsed = ServiceAccountCredentials::from_json(json.expose_secret())?;
        *project = parsed.project_id;
        Ok(super::google::GoogleAuth::ServiceAccount {
            credential: json,
            tokens: self.vertex_tokens.clone(),
        })
    }

    #[cfg(all(feature = "google", not(feature = "gcp")))]
    fn service_account(
        &self,
        _json: SecretString,
        _project: &mut Option<String>,
    ) -> Result<super::google::GoogleAuth, LlmError> {
        Err(feature_disabled("gcp", ApiType::VertexAi))
    }

    #[cfg(feature = "github-copilot")]
    fn copilot(&self, settings: &ProviderSettings) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        let adapter =
            GithubCopilotAdapter::from_settings(self.http.clone(), settings, self.copilot_tokens.clone())?;
        Ok(Arc::new(adapter))
    }

    #[cfg(not(feature = "github-copilot"))]
    fn copilot(&self, _settings: &ProviderSettings) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        Err(feature_disabled("github-copilot", ApiType::GithubCopilot))
    }
}

impl AdapterFactory for DefaultAdapterFactory {
    fn build(
        &self,
        api_type: ApiType,
        settings: &ProviderSettings,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        match api_type.family() {
            ProviderFamily::OpenAiCompatible => self.openai(api_type, settings),
            ProviderFamily::Anthropic => self.anthropic(settings),
            ProviderFamily::Google => self.google(api_type, settings),
            ProviderFamily::GithubCopilot => self.copilot(settings),
        }
    }
}
