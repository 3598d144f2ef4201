//! Uniform runtime
//!
//! Resolves routers, matches one per request and walks its option list in
//! order until an attempt succeeds. Every attempt is reported to the
//! configured [`RouteAttemptSink`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

use super::attempt::{RouteAttemptResult, RouteAttemptSink};
use super::config::{RouterEntry, RouterOption};
use super::matcher::match_router;
use crate::config::ProviderSettings;
use crate::error::{ErrorKind, LlmError};
use crate::providers::{
    AdapterFactory, ApiType, CallOptions, DefaultAdapterFactory, ProviderAdapter, ProviderClient,
};
use crate::streaming::{CancelHandle, ChunkStream, PipelineOptions, StreamCallbacks};
use crate::types::{
    ChatRequest, EmbeddingRequest, EmbeddingResponse, ImageRequest, ImageResponse, ModelInfo,
    ModelPricing, ObjectRequest, ObjectResponse, SpeechRequest, SpeechResponse,
};

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// What a dynamic resolver knows about the request.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    /// `None` for `models()`
    pub model: Option<String>,
}

/// Produces the router list per request.
#[async_trait]
pub trait RouterResolver: Send + Sync {
    async fn resolve(
        &self,
        settings: &ProviderSettings,
        context: &RouteContext,
    ) -> Result<Vec<RouterEntry>, LlmError>;
}

/// Custom model listing against the matched provider's client.
#[async_trait]
pub trait ModelsResolver: Send + Sync {
    async fn list(&self, client: &ProviderClient) -> Result<Vec<ModelInfo>, LlmError>;
}

#[derive(Clone)]
pub enum RouterSource {
    Static(Arc<Vec<RouterEntry>>),
    Dynamic(Arc<dyn RouterResolver>),
}

/// Per-request options.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub signal: Option<CancelHandle>,
    pub callbacks: Option<Arc<dyn StreamCallbacks>>,
    pub headers: BTreeMap<String, String>,
    pub user: Option<String>,
    pub pricing: Option<ModelPricing>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("signal", &self.signal)
            .field("callbacks", &self.callbacks.is_some())
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("user", &self.user)
            .field("pricing", &self.pricing)
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(mut self, signal: CancelHandle) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn callbacks(mut self, callbacks: Arc<dyn StreamCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn pricing(mut self, pricing: ModelPricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    fn call_options(&self) -> CallOptions {
        CallOptions {
            pipeline: PipelineOptions {
                callbacks: self.callbacks.clone(),
                signal: self.signal.clone(),
                pricing: self.pricing,
            },
            headers: self.headers.clone(),
            user: self.user.clone(),
        }
    }
}

/// Routed entry point for every capability.
#[derive(Clone)]
pub struct UniformRuntime {
    source: RouterSource,
    settings: ProviderSettings,
    sink: Option<Arc<dyn RouteAttemptSink>>,
    factory: Arc<dyn AdapterFactory>,
    models_resolver: Option<Arc<dyn ModelsResolver>>,
    env: EnvLookup,
}

static_assertions::assert_impl_all!(UniformRuntime: Send, Sync);
static_assertions::assert_impl_all!(RequestOptions: Send, Sync);

impl std::fmt::Debug for UniformRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            RouterSource::Static(routers) => format!("static({})", routers.len()),
            RouterSource::Dynamic(_) => "dynamic".to_string(),
        };
        f.debug_struct("UniformRuntime")
            .field("source", &source)
            .field("settings", &self.settings)
            .field("sink", &self.sink.is_some())
            .field("models_resolver", &self.models_resolver.is_some())
            .finish_non_exhaustive()
    }
}

impl UniformRuntime {
    pub fn builder() -> UniformRuntimeBuilder {
        UniformRuntimeBuilder::default()
    }

    pub async fn chat(
        &self,
        request: ChatRequest,
        options: RequestOptions,
    ) -> Result<ChunkStream, LlmError> {
        let request = &request;
        self.dispatch(&request.model, &options, |adapter, call| {
            Box::pin(async move { adapter.chat(request, &call).await })
        })
        .await
    }

    pub async fn embeddings(
        &self,
        request: EmbeddingRequest,
        options: RequestOptions,
    ) -> Result<EmbeddingResponse, LlmError> {
        let request = &request;
        self.dispatch(&request.model, &options, |adapter, call| {
            Box::pin(async move { adapter.embeddings(request, &call).await })
        })
        .await
    }

    pub async fn create_image(
        &self,
        request: ImageRequest,
        options: RequestOptions,
    ) -> Result<ImageResponse, LlmError> {
        let request = &request;
        self.dispatch(&request.model, &options, |adapter, call| {
            Box::pin(async move { adapter.create_image(request, &call).await })
        })
        .await
    }

    pub async fn generate_object(
        &self,
        request: ObjectRequest,
        options: RequestOptions,
    ) -> Result<ObjectResponse, LlmError> {
        let request = &request;
        self.dispatch(&request.model, &options, |adapter, call| {
            Box::pin(async move { adapter.generate_object(request, &call).await })
        })
        .await
    }

    pub async fn text_to_speech(
        &self,
        request: SpeechRequest,
        options: RequestOptions,
    ) -> Result<SpeechResponse, LlmError> {
        let request = &request;
        self.dispatch(&request.model, &options, |adapter, call| {
            Box::pin(async move { adapter.text_to_speech(request, &call).await })
        })
        .await
    }

    /// List models from the last resolved router's first option.
    pub async fn models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let routers = self.resolve_routers(None).await?;
        let router = routers.last().ok_or(LlmError::EmptyProviders)?;
        let options = router.options.normalize(router.id.as_deref())?;
        let option = options.first().ok_or_else(|| LlmError::EmptyProviderOptions {
            router: router.id.clone(),
        })?;
        let (api_type, settings) = self.attempt_settings(router, option);
        let adapter = self.factory_for(router).build(api_type, &settings)?;
        match &self.models_resolver {
            Some(resolver) => resolver.list(adapter.client()).await,
            None => adapter.models().await,
        }
    }

    async fn resolve_routers(&self, model: Option<&str>) -> Result<Arc<Vec<RouterEntry>>, LlmError> {
        let routers = match &self.source {
            RouterSource::Static(routers) => routers.clone(),
            RouterSource::Dynamic(resolver) => {
                let context = RouteContext {
                    model: model.map(str::to_string),
                };
                Arc::new(resolver.resolve(&self.settings, &context).await?)
            }
        };
        if routers.is_empty() {
            return Err(LlmError::EmptyProviders);
        }
        Ok(routers)
    }

    fn factory_for(&self, router: &RouterEntry) -> Arc<dyn AdapterFactory> {
        router
            .factory
            .clone()
            .unwrap_or_else(|| self.factory.clone())
    }

    /// `global defaults < router defaults < runtime settings < option`
    fn attempt_settings(
        &self,
        router: &RouterEntry,
        option: &RouterOption,
    ) -> (ApiType, ProviderSettings) {
        let api_type = option.api_type.unwrap_or(router.api_type);
        let settings = ProviderSettings::defaults_with_env(api_type, |key| (self.env)(key))
            .merge(&router.defaults)
            .merge(&self.settings)
            .merge(&option.settings);
        (api_type, settings)
    }

    async fn dispatch<'a, T, F>(
        &'a self,
        model: &'a str,
        options: &'a RequestOptions,
        invoke: F,
    ) -> Result<T, LlmError>
    where
        F: Fn(Arc<dyn ProviderAdapter>, CallOptions) -> BoxFuture<'a, Result<T, LlmError>>,
    {
        let routers = self.resolve_routers(Some(model)).await?;
        let router = match_router(&routers, model, self.settings.base_url.as_deref())
            .ok_or(LlmError::EmptyProviders)?;
        let router_options = router.options.normalize(router.id.as_deref())?;
        let factory = self.factory_for(router);

        let mut last_error = None;
        for (attempt, option) in router_options.iter().enumerate() {
            if options.signal.as_ref().is_some_and(CancelHandle::is_cancelled) {
                return Err(LlmError::RequestCancelled);
            }
            let (api_type, settings) = self.attempt_settings(router, option);
            let provider_id = settings
                .provider_id
                .clone()
                .unwrap_or_else(|| api_type.to_string());
            tracing::debug!(provider = %provider_id, model, attempt, "dispatching attempt");

            let started = Instant::now();
            let result = match factory.build(api_type, &settings) {
                Ok(adapter) => invoke(adapter, options.call_options()).await,
                Err(e) => Err(e),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            self.record(RouteAttemptResult {
                api_type,
                provider_id: provider_id.clone(),
                router_id: router.id.clone(),
                channel_id: option.id.clone(),
                remark: option.remark.clone(),
                model: model.to_string(),
                success: result.is_ok(),
                duration_ms,
                error: result.as_ref().err().cloned(),
            })
            .await;

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(provider = %provider_id, model, attempt, duration_ms, "fallback recovered");
                    }
                    return Ok(value);
                }
                Err(e) if e.kind() == ErrorKind::RequestCancelled => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        provider = %provider_id,
                        model,
                        attempt,
                        duration_ms,
                        error = %e,
                        "provider attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::EmptyProviderOptions {
            router: router.id.clone(),
        }))
    }

    async fn record(&self, attempt: RouteAttemptResult) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.record(&attempt).await {
            tracing::warn!(error = %e, "route attempt sink failed");
        }
    }
}

/// Builder for [`UniformRuntime`].
#[derive(Default)]
pub struct UniformRuntimeBuilder {
    routers: Vec<RouterEntry>,
    resolver: Option<Arc<dyn RouterResolver>>,
    settings: ProviderSettings,
    sink: Option<Arc<dyn RouteAttemptSink>>,
    factory: Option<Arc<dyn AdapterFactory>>,
    models_resolver: Option<Arc<dyn ModelsResolver>>,
    env: Option<EnvLookup>,
}

impl UniformRuntimeBuilder {
    /// Append a static router.
    pub fn router(mut self, router: RouterEntry) -> Self {
        self.routers.push(router);
        self
    }

    pub fn routers(mut self, routers: Vec<RouterEntry>) -> Self {
        self.routers.extend(routers);
        self
    }

    /// Resolve routers per request instead of using a static list.
    pub fn resolver(mut self, resolver: Arc<dyn RouterResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Caller-level settings. `base_url` here is also the target endpoint
    /// matched against router patterns.
    pub fn settings(mut self, settings: ProviderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn RouteAttemptSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn models_resolver(mut self, resolver: Arc<dyn ModelsResolver>) -> Self {
        self.models_resolver = Some(resolver);
        self
    }

    /// Environment lookup for global defaults; the process environment
    /// otherwise.
    pub fn env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Some(Arc::new(lookup));
        self
    }

    pub fn build(self) -> Result<UniformRuntime, LlmError> {
        let source = match self.resolver {
            Some(_) if !self.routers.is_empty() => {
                return Err(LlmError::ConfigurationError(
                    "static routers and a router resolver are mutually exclusive".into(),
                ));
            }
            Some(resolver) => RouterSource::Dynamic(resolver),
            None => RouterSource::Static(Arc::new(self.routers)),
        };
        Ok(UniformRuntime {
            source,
            settings: self.settings,
            sink: self.sink,
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(DefaultAdapterFactory::default())),
            models_resolver: self.models_resolver,
            env: self
                .env
                .unwrap_or_else(|| Arc::new(|key: &str| std::env::var(key).ok())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::MemoryAttemptSink;
    use crate::streaming::StreamChunk;
    use crate::types::ChatMessage;
    use futures::StreamExt;
    use std::sync::Mutex;

    /// Adapter whose behaviour is chosen by the api key it was built with.
    struct ScriptedAdapter {
        client: ProviderClient,
        key: String,
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        fn provider_id(&self) -> &str {
            &self.client.provider_id
        }

        fn client(&self) -> &ProviderClient {
            &self.client
        }

        async fn chat(
            &self,
            _request: &ChatRequest,
            _options: &CallOptions,
        ) -> Result<ChunkStream, LlmError> {
            match self.key.as_str() {
                "fail" => Err(LlmError::business(&self.client.provider_id, Some(500), "boom", None)),
                "cancel" => Err(LlmError::RequestCancelled),
                key => {
                    let chunks = vec![StreamChunk::text("c1", key.to_string())];
                    Ok(futures::stream::iter(chunks).boxed())
                }
            }
        }

        async fn models(&self) -> Result<Vec<ModelInfo>, LlmError> {
            Ok(vec![ModelInfo::new(self.key.clone())])
        }
    }

    #[derive(Default)]
    struct ScriptedFactory {
        built: Mutex<Vec<(ApiType, ProviderSettings)>>,
    }

    impl ScriptedFactory {
        fn built(&self) -> Vec<(ApiType, ProviderSettings)> {
            self.built.lock().unwrap().clone()
        }
    }

    impl AdapterFactory for ScriptedFactory {
        fn build(
            &self,
            api_type: ApiType,
            settings: &ProviderSettings,
        ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
            self.built.lock().unwrap().push((api_type, settings.clone()));
            let key = settings
                .expose_api_key()
                .ok_or_else(|| LlmError::ConfigurationError("missing key".into()))?;
            let provider_id = settings.provider_id.clone().unwrap_or_else(|| api_type.to_string());
            Ok(Arc::new(ScriptedAdapter {
                client: ProviderClient::new(
                    reqwest::Client::new(),
                    provider_id,
                    settings.base_url.clone().unwrap_or_default(),
                    Default::default(),
                ),
                key: key.to_string(),
            }))
        }
    }

    fn runtime(
        routers: Vec<RouterEntry>,
        factory: Arc<ScriptedFactory>,
        sink: Arc<MemoryAttemptSink>,
    ) -> UniformRuntime {
        UniformRuntime::builder()
            .routers(routers)
            .factory(factory)
            .sink(sink)
            .env_lookup(|_| None)
            .build()
            .unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4o", vec![ChatMessage::user("hi")])
    }

    async fn text_of(stream: ChunkStream) -> Vec<StreamChunk> {
        stream.collect().await
    }

    #[tokio::test]
    async fn falls_back_in_order_and_reports_every_attempt() {
        let factory = Arc::new(ScriptedFactory::default());
        let sink = Arc::new(MemoryAttemptSink::new());
        let router = RouterEntry::new(ApiType::OpenAi)
            .id("main")
            .option(RouterOption::new().id("a").api_key("fail"))
            .option(RouterOption::new().id("b").api_key("fail"))
            .option(RouterOption::new().id("c").remark("last").api_key("ok"));
        let runtime = runtime(vec![router], factory.clone(), sink.clone());

        let chunks = text_of(runtime.chat(request(), RequestOptions::new()).await.unwrap()).await;
        assert_eq!(chunks.len(), 1);

        let attempts = sink.attempts();
        let outcome: Vec<_> = attempts
            .iter()
            .map(|a| (a.channel_id.as_deref(), a.success))
            .collect();
        assert_eq!(outcome, vec![(Some("a"), false), (Some("b"), false), (Some("c"), true)]);
        assert!(attempts.iter().all(|a| a.router_id.as_deref() == Some("main")));
        assert!(attempts[0].error.is_some());
        assert_eq!(attempts[2].remark.as_deref(), Some("last"));
        assert_eq!(factory.built().len(), 3);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn recovery_after_a_failed_attempt_is_logged() {
        let router = RouterEntry::new(ApiType::OpenAi)
            .option(RouterOption::new().api_key("fail"))
            .option(RouterOption::new().api_key("ok"));
        let runtime = runtime(
            vec![router],
            Arc::new(ScriptedFactory::default()),
            Arc::new(MemoryAttemptSink::new()),
        );
        runtime.chat(request(), RequestOptions::new()).await.unwrap();
        assert!(logs_contain("provider attempt failed"));
        assert!(logs_contain("fallback recovered"));
    }

    #[tokio::test]
    async fn last_error_is_raised_when_every_option_fails() {
        let factory = Arc::new(ScriptedFactory::default());
        let sink = Arc::new(MemoryAttemptSink::new());
        let router = RouterEntry::new(ApiType::OpenAi)
            .option(RouterOption::new().api_key("fail"))
            .option(RouterOption::new().api_type(ApiType::Anthropic).api_key("fail"));
        let runtime = runtime(vec![router], factory, sink.clone());

        let err = runtime.chat(request(), RequestOptions::new()).await.err().unwrap();
        assert!(matches!(&err, LlmError::ProviderBusinessError { provider, .. } if provider == "anthropic"));
        assert_eq!(sink.attempts().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_the_fallback_loop() {
        let factory = Arc::new(ScriptedFactory::default());
        let sink = Arc::new(MemoryAttemptSink::new());
        let router = RouterEntry::new(ApiType::OpenAi)
            .option(RouterOption::new().api_key("cancel"))
            .option(RouterOption::new().api_key("ok"));
        let runtime = runtime(vec![router], factory.clone(), sink.clone());

        let err = runtime.chat(request(), RequestOptions::new()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RequestCancelled);
        assert_eq!(sink.attempts().len(), 1);

        let signal = CancelHandle::new();
        signal.cancel();
        let err = runtime
            .chat(request(), RequestOptions::new().signal(signal))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::RequestCancelled);
        assert_eq!(factory.built().len(), 1);
    }

    #[tokio::test]
    async fn settings_layer_from_defaults_to_option() {
        let factory = Arc::new(ScriptedFactory::default());
        let router = RouterEntry::new(ApiType::OpenAi)
            .defaults(
                ProviderSettings::new()
                    .api_key("router")
                    .organization("org-router")
                    .header("x-layer", "router"),
            )
            .option(RouterOption::new().settings(ProviderSettings::new().header("x-layer", "option")));
        let runtime = UniformRuntime::builder()
            .router(router)
            .settings(ProviderSettings::new().api_key("caller"))
            .factory(factory.clone())
            .env_lookup(|_| None)
            .build()
            .unwrap();

        runtime.chat(request(), RequestOptions::new()).await.unwrap();
        let (_, settings) = factory.built().pop().unwrap();
        assert_eq!(settings.expose_api_key(), Some("caller"));
        assert_eq!(settings.organization.as_deref(), Some("org-router"));
        assert_eq!(settings.base_url.as_deref(), Some("https://api.openai.com/v1"));
        assert_eq!(settings.headers.get("x-layer").map(String::as_str), Some("option"));
    }

    #[tokio::test]
    async fn empty_routers_and_empty_options_are_distinct() {
        let factory = Arc::new(ScriptedFactory::default());
        let sink = Arc::new(MemoryAttemptSink::new());
        let none = runtime(vec![], factory.clone(), sink.clone());
        let err = none.chat(request(), RequestOptions::new()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::EmptyProviders);

        let empty = runtime(vec![RouterEntry::new(ApiType::OpenAi)], factory, sink);
        let err = empty.chat(request(), RequestOptions::new()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::EmptyProviderOptions);
    }

    struct FailingSink;

    #[async_trait]
    impl RouteAttemptSink for FailingSink {
        async fn record(&self, _attempt: &RouteAttemptResult) -> Result<(), LlmError> {
            Err(LlmError::InternalError("sink down".into()))
        }
    }

    #[tokio::test]
    async fn sink_failures_do_not_fail_the_call() {
        let runtime = UniformRuntime::builder()
            .router(RouterEntry::new(ApiType::OpenAi).option(RouterOption::new().api_key("ok")))
            .factory(Arc::new(ScriptedFactory::default()))
            .sink(Arc::new(FailingSink))
            .env_lookup(|_| None)
            .build()
            .unwrap();
        assert!(runtime.chat(request(), RequestOptions::new()).await.is_ok());
    }

    struct ByModel;

    #[async_trait]
    impl RouterResolver for ByModel {
        async fn resolve(
            &self,
            _settings: &ProviderSettings,
            context: &RouteContext,
        ) -> Result<Vec<RouterEntry>, LlmError> {
            let key = context.model.clone().unwrap_or_else(|| "listing".into());
            Ok(vec![
                RouterEntry::new(ApiType::Groq).option(RouterOption::new().api_key(key)),
            ])
        }
    }

    #[tokio::test]
    async fn dynamic_resolver_sees_the_model() {
        let runtime = UniformRuntime::builder()
            .resolver(Arc::new(ByModel))
            .factory(Arc::new(ScriptedFactory::default()))
            .env_lookup(|_| None)
            .build()
            .unwrap();
        let chunks = text_of(runtime.chat(request(), RequestOptions::new()).await.unwrap()).await;
        assert!(matches!(&chunks[0].data, crate::streaming::ChunkData::Text(t) if t == "gpt-4o"));

        let models = runtime.models().await.unwrap();
        assert_eq!(models[0].id, "listing");
    }

    #[test]
    fn resolver_and_static_routers_conflict() {
        let result = UniformRuntime::builder()
            .router(RouterEntry::new(ApiType::OpenAi))
            .resolver(Arc::new(ByModel))
            .build();
        assert!(matches!(result, Err(LlmError::ConfigurationError(_))));
    }

    struct ClientEcho;

    #[async_trait]
    impl ModelsResolver for ClientEcho {
        async fn list(&self, client: &ProviderClient) -> Result<Vec<ModelInfo>, LlmError> {
            Ok(vec![ModelInfo::new(client.base_url.clone())])
        }
    }

    #[tokio::test]
    async fn models_use_last_router_first_option() {
        let runtime = UniformRuntime::builder()
            .router(RouterEntry::new(ApiType::OpenAi).option(RouterOption::new().api_key("first-router")))
            .router(
                RouterEntry::new(ApiType::OpenAi)
                    .option(RouterOption::new().api_key("k").base_url("https://second"))
                    .option(RouterOption::new().api_key("k").base_url("https://unused")),
            )
            .factory(Arc::new(ScriptedFactory::default()))
            .models_resolver(Arc::new(ClientEcho))
            .env_lookup(|_| None)
            .build()
            .unwrap();
        let models = runtime.models().await.unwrap();
        assert_eq!(models[0].id, "https://second");
    }
}
