//! Configuration
//!
//! [`ProviderSettings`] is the credential/config bag merged at every layer of
//! the router (`global defaults < router defaults < caller settings < option
//! overrides`). [`RuntimeConfig`] is the serde form of a whole runtime,
//! loaded from JSON.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::LlmError;
use crate::observability::mask_sensitive_value;
use crate::providers::ApiType;
use crate::router::{RouterEntry, UniformRuntime};

/// Credential and endpoint settings for one provider call.
#[derive(Clone, Default, Deserialize)]
pub struct ProviderSettings {
    /// Bearer key; for `vertexai` a service-account JSON blob.
    #[serde(default, deserialize_with = "deserialize_secret", alias = "apiKey")]
    pub api_key: Option<SecretString>,
    #[serde(default, alias = "baseURL", alias = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default, alias = "apiVersion")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Provider id reported in telemetry; defaults to the api type.
    #[serde(default, alias = "providerId")]
    pub provider_id: Option<String>,
    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field(
                "api_key",
                &self
                    .api_key
                    .as_ref()
                    .map(|k| mask_sensitive_value(k.expose_secret())),
            )
            .field("base_url", &self.base_url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("organization", &self.organization)
            .field("api_version", &self.api_version)
            .field("project", &self.project)
            .field("location", &self.location)
            .field("provider_id", &self.provider_id)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Layer `higher` over `self`: every field present in `higher` wins,
    /// headers merge key by key.
    pub fn merge(&self, higher: &ProviderSettings) -> ProviderSettings {
        let mut headers = self.headers.clone();
        headers.extend(higher.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        ProviderSettings {
            api_key: higher.api_key.clone().or_else(|| self.api_key.clone()),
            base_url: higher.base_url.clone().or_else(|| self.base_url.clone()),
            headers,
            organization: higher.organization.clone().or_else(|| self.organization.clone()),
            api_version: higher.api_version.clone().or_else(|| self.api_version.clone()),
            project: higher.project.clone().or_else(|| self.project.clone()),
            location: higher.location.clone().or_else(|| self.location.clone()),
            provider_id: higher.provider_id.clone().or_else(|| self.provider_id.clone()),
            timeout_secs: higher.timeout_secs.or(self.timeout_secs),
        }
    }

    pub fn expose_api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }

    /// Global defaults for an api type, reading keys from the process
    /// environment.
    pub fn defaults_for(api_type: ApiType) -> ProviderSettings {
        Self::defaults_with_env(api_type, |key| std::env::var(key).ok())
    }

    /// Global defaults with an explicit environment lookup.
    pub fn defaults_with_env(
        api_type: ApiType,
        env: impl Fn(&str) -> Option<String>,
    ) -> ProviderSettings {
        let lookup = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| env(k))
                .filter(|v| !v.trim().is_empty())
        };
        let mut settings = ProviderSettings {
            base_url: api_type.default_base_url().map(str::to_string),
            api_key: lookup(api_type.env_keys()).map(SecretString::from),
            ..Default::default()
        };
        if api_type == ApiType::VertexAi {
            settings.project = lookup(&["GOOGLE_CLOUD_PROJECT", "GOOGLE_VERTEX_PROJECT"]);
            settings.location = lookup(&["GOOGLE_CLOUD_LOCATION", "GOOGLE_VERTEX_LOCATION"])
                .or_else(|| Some("us-central1".to_string()));
        }
        if api_type == ApiType::Anthropic {
            settings.api_version = Some("2023-06-01".to_string());
        }
        settings
    }
}

/// Serializable runtime definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    /// Ordered router list; the last entry is the catch-all.
    #[serde(default)]
    pub routers: Vec<RouterEntry>,
    /// Caller-level settings, layered above router defaults.
    #[serde(default)]
    pub settings: ProviderSettings,
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, LlmError> {
        serde_json::from_str(json)
            .map_err(|e| LlmError::ConfigurationError(format!("Invalid runtime config: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LlmError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LlmError::ConfigurationError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn into_runtime(self) -> Result<UniformRuntime, LlmError> {
        UniformRuntime::builder()
            .routers(self.routers)
            .settings(self.settings)
            .build()
    }
}
