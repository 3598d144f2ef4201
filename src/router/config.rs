//! Router entries and provider options.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;

use crate::config::ProviderSettings;
use crate::error::LlmError;
use crate::providers::{AdapterFactory, ApiType};

/// One credential/endpoint choice inside a router. Settings keys sit next
/// to `apiType`/`id`/`remark` in JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterOption {
    /// Overrides the router's api type for this option only
    #[serde(default, alias = "api_type")]
    pub api_type: Option<ApiType>,
    /// Channel id reported in telemetry
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(flatten)]
    pub settings: ProviderSettings,
}

impl RouterOption {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_type(mut self, api_type: ApiType) -> Self {
        self.api_type = Some(api_type);
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.settings = self.settings.api_key(key);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.settings = self.settings.base_url(url);
        self
    }

    pub fn settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// `options` accepts a single object or a list; list entries may be null.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RouterOptions {
    Many(Vec<Option<RouterOption>>),
    Single(RouterOption),
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl RouterOptions {
    /// Ordered option list. Empty, or containing a null entry, is an error.
    pub fn normalize(&self, router: Option<&str>) -> Result<Vec<RouterOption>, LlmError> {
        let empty = || LlmError::EmptyProviderOptions {
            router: router.map(str::to_string),
        };
        match self {
            Self::Single(option) => Ok(vec![option.clone()]),
            Self::Many(options) if options.is_empty() => Err(empty()),
            Self::Many(options) => options
                .iter()
                .map(|o| o.clone().ok_or_else(empty))
                .collect(),
        }
    }

    fn push(&mut self, option: RouterOption) {
        match self {
            Self::Many(options) => options.push(Some(option)),
            Self::Single(first) => *self = Self::Many(vec![Some(first.clone()), Some(option)]),
        }
    }
}

fn deserialize_options<'de, D>(deserializer: D) -> Result<RouterOptions, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RouterOptions>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_pattern<'de, D>(deserializer: D) -> Result<Option<Regex>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|pattern| Regex::new(&pattern).map_err(serde::de::Error::custom))
        .transpose()
}

/// A group of provider options selected by model name or target endpoint.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "api_type")]
    pub api_type: ApiType,
    /// Matches the caller's target base URL
    #[serde(default, alias = "base_url_pattern", deserialize_with = "deserialize_pattern")]
    pub base_url_pattern: Option<Regex>,
    /// Models served by this router; empty means catch-all
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: RouterOptions,
    /// Settings layered below the caller's and the option's
    #[serde(default)]
    pub defaults: ProviderSettings,
    /// Replaces the runtime's adapter factory for this router
    #[serde(skip)]
    pub factory: Option<Arc<dyn AdapterFactory>>,
}

impl std::fmt::Debug for RouterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterEntry")
            .field("id", &self.id)
            .field("api_type", &self.api_type)
            .field("base_url_pattern", &self.base_url_pattern.as_ref().map(Regex::as_str))
            .field("models", &self.models)
            .field("options", &self.options)
            .field("defaults", &self.defaults)
            .field("factory", &self.factory.is_some())
            .finish()
    }
}

impl RouterEntry {
    pub fn new(api_type: ApiType) -> Self {
        Self {
            id: None,
            api_type,
            base_url_pattern: None,
            models: Vec::new(),
            options: RouterOptions::default(),
            defaults: ProviderSettings::default(),
            factory: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn base_url_pattern(mut self, pattern: Regex) -> Self {
        self.base_url_pattern = Some(pattern);
        self
    }

    /// Append an option to the fallback list.
    pub fn option(mut self, option: RouterOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn defaults(mut self, defaults: ProviderSettings) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn serves(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}
