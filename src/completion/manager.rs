//! Completion manager: provider registry with caching, retry and tracing.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::cache::{fingerprint, ResponseCache};
use super::provider::CompletionProvider;
use crate::config::CompletionConfig;
use crate::error::CompletionError;
use crate::trace::{SpanEnd, SpanError, SpanStart, TraceBus, TraceEvent};
use crate::types::{CompletionRequest, CompletionResponse, ProviderCapabilities};

/// Longest single backoff wait.
const MAX_BACKOFF_SECS: f64 = 300.0;

pub struct CompletionManager {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
    default_provider: String,
    cache: Option<ResponseCache>,
    max_retries: u32,
    backoff_multiplier: f64,
    trace: TraceBus,
}

impl CompletionManager {
    pub fn new(config: &CompletionConfig) -> Self {
        let cache = config.cache_enabled.then(|| {
            ResponseCache::new(
                Duration::from_secs(config.cache_ttl_secs),
                config.cache_max_entries,
            )
        });

        Self {
            providers: HashMap::new(),
            default_provider: config.default_provider.clone(),
            cache,
            max_retries: config.max_retries.max(1),
            backoff_multiplier: config.backoff_multiplier,
            trace: TraceBus::disabled(),
        }
    }

    pub fn with_tracer(mut self, trace: TraceBus) -> Self {
        self.trace = trace;
        self
    }

    /// Register a provider under its own name, replacing any previous one.
    pub fn register_provider(&mut self, provider: Arc<dyn CompletionProvider>) {
        let name = provider.name().to_string();
        debug!("Registered completion provider: {}", name);
        self.providers.insert(name, provider);
    }

    pub fn set_default_provider(&mut self, name: impl Into<String>) {
        self.default_provider = name.into();
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map(|c| c.len()).unwrap_or(0)
    }

    fn lookup(&self, name: Option<&str>) -> Result<&Arc<dyn CompletionProvider>, CompletionError> {
        let name = name.unwrap_or(self.default_provider.as_str());
        self.providers
            .get(name)
            .ok_or_else(|| CompletionError::ProviderNotFound(name.to_string()))
    }

    fn resolve(&self, name: Option<&str>) -> Result<&Arc<dyn CompletionProvider>, CompletionError> {
        let provider = self.lookup(name)?;
        if !provider.is_configured() {
            return Err(CompletionError::ProviderMisconfigured(
                provider.name().to_string(),
            ));
        }
        Ok(provider)
    }

    /// Wait before the attempt after `attempt` (zero-based): multiplier^attempt seconds.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let secs = self.backoff_multiplier.powi(attempt as i32);
        if !secs.is_finite() {
            return Duration::from_secs_f64(MAX_BACKOFF_SECS);
        }
        Duration::from_secs_f64(secs.clamp(0.0, MAX_BACKOFF_SECS))
    }

    /// Run one completion, served from cache when possible.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        provider: Option<&str>,
    ) -> Result<Arc<CompletionResponse>, CompletionError> {
        let provider = self.resolve(provider)?;
        let name = provider.name().to_string();

        let key = self.cache.as_ref().map(|_| fingerprint(request));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                debug!("Completion cache hit ({})", &key[..12]);
                return Ok(hit);
            }
        }

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            let span_id = ulid::Ulid::new().to_string();
            let started = Instant::now();

            self.trace.emit(TraceEvent::SpanStart(SpanStart {
                span_id: span_id.clone(),
                provider: name.clone(),
                model: request.model.clone(),
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                top_p: request.top_p,
                attempt: attempt + 1,
                metadata: request.metadata.clone(),
                started_at: Utc::now(),
            }));

            match provider.complete(request).await {
                Ok(response) => {
                    self.trace.emit(TraceEvent::SpanEnd(SpanEnd {
                        span_id,
                        model: response.model.clone(),
                        output: response.content.clone(),
                        usage: response.usage.clone(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }));

                    let response = Arc::new(response);
                    if let (Some(cache), Some(key)) = (&self.cache, key) {
                        cache.insert(key, response.clone());
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        "Completion attempt {}/{} via {} failed: {:#}",
                        attempt + 1,
                        self.max_retries,
                        name,
                        e
                    );
                    last_error = format!("{:#}", e);
                    self.trace.emit(TraceEvent::SpanError(SpanError {
                        span_id,
                        error: last_error.clone(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }));

                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(CompletionError::CompletionExhausted {
            provider: name,
            attempts: self.max_retries,
            last_error,
        })
    }

    /// Embed texts. No cache, no retry.
    pub async fn embeddings(
        &self,
        texts: &[String],
        provider: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, CompletionError> {
        let provider = self.resolve(provider)?;
        provider
            .embeddings(texts)
            .await
            .map_err(|e| CompletionError::Provider {
                provider: provider.name().to_string(),
                reason: format!("{:#}", e),
            })
    }

    pub fn capabilities(
        &self,
        provider: Option<&str>,
    ) -> Result<ProviderCapabilities, CompletionError> {
        Ok(self.lookup(provider)?.capabilities())
    }

    /// An unconfigured provider is reported unhealthy without being called.
    pub async fn check_health(&self, provider: Option<&str>) -> Result<bool, CompletionError> {
        let provider = self.lookup(provider)?;
        if !provider.is_configured() {
            return Ok(false);
        }
        Ok(provider.health_check().await)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedProvider;
    use super::*;
    use crate::trace::testing::{FailingTracer, RecordingTracer};
    use crate::types::ChatMessage;

    fn config() -> CompletionConfig {
        CompletionConfig {
            default_provider: "scripted".into(),
            ..CompletionConfig::default()
        }
    }

    fn manager_with(provider: Arc<ScriptedProvider>) -> CompletionManager {
        let mut manager = CompletionManager::new(&config());
        manager.register_provider(provider);
        manager
    }

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user(text)])
    }

    #[tokio::test]
    async fn cache_hit_returns_same_response_without_provider_call() {
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let manager = manager_with(provider.clone());

        let first = manager.complete(&request("hello"), None).await.unwrap();
        let second = manager
            .complete(&request("hello").with_tag("agent", "other"), None)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn different_parameters_miss_the_cache() {
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let manager = manager_with(provider.clone());

        manager.complete(&request("hello"), None).await.unwrap();
        manager
            .complete(&request("hello").with_temperature(0.2), None)
            .await
            .unwrap();
        manager
            .complete(&request("hello").with_max_tokens(64), None)
            .await
            .unwrap();

        assert_eq!(provider.calls(), 3);
        assert_eq!(manager.cache_len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_triggers_one_fresh_call() {
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let manager = manager_with(provider.clone());

        let first = manager.complete(&request("hello"), None).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        let second = manager.complete(&request("hello"), None).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.content, "reply 2");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn disabled_cache_always_calls_provider() {
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let mut manager = CompletionManager::new(&CompletionConfig {
            cache_enabled: false,
            ..config()
        });
        manager.register_provider(provider.clone());

        manager.complete(&request("hello"), None).await.unwrap();
        manager.complete(&request("hello"), None).await.unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(manager.cache_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_provider_exhausts_retries_with_backoff() {
        let provider = Arc::new(ScriptedProvider::failing("scripted", u32::MAX));
        let manager = manager_with(provider.clone());

        let started = Instant::now();
        let err = manager.complete(&request("hello"), None).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(provider.calls(), 3);
        // 2^0 + 2^1 seconds between the three attempts, none after the last.
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(4), "elapsed {:?}", elapsed);
        match err {
            CompletionError::CompletionExhausted {
                provider,
                attempts,
                last_error,
            } => {
                assert_eq!(provider, "scripted");
                assert_eq!(attempts, 3);
                assert!(last_error.contains("attempt 3 failed"));
            }
            other => panic!("expected CompletionExhausted, got: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovered_call_is_cached_once() {
        let provider = Arc::new(ScriptedProvider::failing("scripted", 2));
        let manager = manager_with(provider.clone());

        let first = manager.complete(&request("hello"), None).await.unwrap();
        assert_eq!(first.content, "reply 3");
        assert_eq!(manager.cache_len(), 1);

        let again = manager.complete(&request("hello"), None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let manager = manager_with(provider.clone());

        let err = manager
            .complete(&request("hello"), Some("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::ProviderNotFound(ref n) if n == "missing"));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn misconfigured_provider_fails_before_any_call() {
        let provider = Arc::new(ScriptedProvider {
            configured: false,
            ..ScriptedProvider::new("scripted")
        });
        let manager = manager_with(provider.clone());

        let err = manager.complete(&request("hello"), None).await.unwrap_err();
        assert!(matches!(err, CompletionError::ProviderMisconfigured(_)));
        assert_eq!(provider.calls(), 0);
        assert!(!manager.check_health(None).await.unwrap());
    }

    #[tokio::test]
    async fn spans_bracket_each_attempt_and_cache_hits_emit_nothing() {
        let tracer = Arc::new(RecordingTracer::default());
        let (bus, handle) = crate::trace::TraceBus::spawn(tracer.clone());
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let manager = manager_with(provider).with_tracer(bus);

        manager.complete(&request("hello"), None).await.unwrap();
        manager.complete(&request("hello"), None).await.unwrap();
        drop(manager);
        handle.await.unwrap();

        assert_eq!(tracer.kinds(), vec!["span_start", "span_end"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_close_spans_with_errors() {
        let tracer = Arc::new(RecordingTracer::default());
        let (bus, handle) = crate::trace::TraceBus::spawn(tracer.clone());
        let provider = Arc::new(ScriptedProvider::failing("scripted", 1));
        let manager = manager_with(provider).with_tracer(bus);

        manager.complete(&request("hello"), None).await.unwrap();
        drop(manager);
        handle.await.unwrap();

        assert_eq!(
            tracer.kinds(),
            vec!["span_start", "span_error", "span_start", "span_end"]
        );
    }

    #[tokio::test]
    async fn tracer_failure_does_not_affect_completion() {
        let (bus, _handle) = crate::trace::TraceBus::spawn(Arc::new(FailingTracer));
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let manager = manager_with(provider.clone()).with_tracer(bus);

        let response = manager.complete(&request("hello"), None).await.unwrap();
        assert_eq!(response.content, "reply 1");
        assert_eq!(provider.calls(), 1);
        assert_eq!(manager.cache_len(), 1);
    }

    #[tokio::test]
    async fn named_provider_overrides_default() {
        let primary = Arc::new(ScriptedProvider::new("scripted"));
        let secondary = Arc::new(ScriptedProvider::replying("secondary", &["from secondary"]));
        let mut manager = manager_with(primary.clone());
        manager.register_provider(secondary.clone());

        let response = manager
            .complete(&request("hello"), Some("secondary"))
            .await
            .unwrap();

        assert_eq!(response.content, "from secondary");
        assert_eq!(primary.calls(), 0);
        assert_eq!(manager.provider_names(), vec!["scripted", "secondary"]);
    }

    #[tokio::test]
    async fn embeddings_and_capabilities_pass_through() {
        let provider = Arc::new(ScriptedProvider::new("scripted"));
        let manager = manager_with(provider);

        let vectors = manager
            .embeddings(&["ab".to_string(), "abc".to_string()], None)
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![2.0], vec![3.0]]);

        let caps = manager.capabilities(None).unwrap();
        assert!(caps.embeddings);
        assert!(manager.check_health(None).await.unwrap());
    }

    #[test]
    fn backoff_follows_multiplier_powers() {
        let manager = CompletionManager::new(&config());
        assert_eq!(manager.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(manager.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(manager.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(manager.backoff_delay(40), Duration::from_secs(300));
    }
}
