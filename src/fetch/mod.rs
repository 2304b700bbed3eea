// src/fetch/mod.rs

//! Shared HTTP fetch layer all source adapters call through.
//!
//! Wraps a [`Fetcher`] implementation with bounded retries (exponential
//! backoff plus jitter), a per-source in-flight cap, and the optional
//! external rendering collaborator for anti-bot protected sources.

pub mod session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::models::FetchConfig;

pub use session::SessionCache;

/// A single outbound request, attributed to a source for rate limiting.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub source: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(source: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A completed HTTP exchange. Non-2xx statuses are returned to the adapter
/// for interpretation, not raised here.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// Response headers with lowercase names
    pub headers: Vec<(String, String)>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Challenge-class responses that warrant a session refresh.
    pub fn is_blocked(&self) -> bool {
        matches!(self.status, 401 | 403 | 503)
    }

    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport seam for the executor. Production uses [`ReqwestFetcher`];
/// tests inject scripted implementations.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Reqwest-backed fetcher.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with the configured user agent and timeout.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(FetchResponse {
            status,
            body,
            headers,
        })
    }
}

/// External headless-rendering collaborator for anti-bot protected sources.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<String>;
}

/// Renderer that delegates to an external rendering service over HTTP.
///
/// POSTs `{"url": ...}` and expects the rendered HTML in `{"html": ...}`.
pub struct HttpRenderer {
    client: Client,
    service_url: String,
}

impl HttpRenderer {
    pub fn new(config: &FetchConfig, service_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            service_url: service_url.into(),
        })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.service_url)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::unavailable(
                "renderer",
                format!("rendering service returned {}", response.status()),
            ));
        }

        let body: serde_json::Value = response.json().await?;
        body.get("html")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::unavailable("renderer", "rendering service returned no html"))
    }
}

/// Whether an HTTP status is worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// Exponential backoff delay with jitter for the given zero-based attempt.
pub fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(6));
    let jitter = rand::rng().random_range(0..base_ms.max(1));
    Duration::from_millis(exp + jitter)
}

/// Rate-limited, retrying fetch executor shared by all adapters.
pub struct FetchExecutor {
    fetcher: Arc<dyn Fetcher>,
    renderer: Option<Arc<dyn Renderer>>,
    config: FetchConfig,
    limiters: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl FetchExecutor {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        renderer: Option<Arc<dyn Renderer>>,
        config: FetchConfig,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: reqwest transport plus the configured rendering
    /// service, if any.
    pub fn with_client(config: FetchConfig) -> Result<Self> {
        let fetcher = Arc::new(ReqwestFetcher::new(&config)?);
        let renderer: Option<Arc<dyn Renderer>> = match &config.render_service_url {
            Some(url) => Some(Arc::new(HttpRenderer::new(&config, url)?)),
            None => None,
        };
        Ok(Self::new(fetcher, renderer, config))
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Upper bound on chapter-list pages per series.
    pub fn max_pages(&self) -> usize {
        self.config.max_pagination_pages
    }

    /// TTL for adapter session handshakes.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.session_ttl_secs)
    }

    fn limiter(&self, source: &str) -> Arc<Semaphore> {
        let mut limiters = self.limiters.lock().expect("limiter map poisoned");
        limiters
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_concurrent_per_source)))
            .clone()
    }

    /// Perform a request, holding a per-source permit across retries.
    ///
    /// Retryable failures (5xx, 429, transport errors) are retried up to
    /// `max_retry_attempts` with backoff; exhaustion maps to
    /// `SourceUnavailable`. Non-retryable statuses are returned to the
    /// caller for interpretation.
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let limiter = self.limiter(&request.source);
        let _permit = limiter
            .acquire_owned()
            .await
            .map_err(|e| AppError::unavailable(&request.source, e))?;

        let attempts = self.config.max_retry_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 0..attempts {
            match self.fetcher.get(&request).await {
                Ok(response) if is_retryable_status(response.status) => {
                    last_failure = format!("status {}", response.status);
                }
                Ok(response) => return Ok(response),
                Err(AppError::Http(e)) => {
                    // Builder errors (malformed URL and friends) cannot
                    // succeed on retry.
                    if e.is_builder() {
                        return Err(AppError::Http(e));
                    }
                    last_failure = e.to_string();
                }
                Err(other) => return Err(other),
            }

            if attempt + 1 < attempts {
                let delay = backoff_delay(self.config.retry_base_delay_ms, attempt);
                log::debug!(
                    "Retrying {} for '{}' in {:?} ({})",
                    request.url,
                    request.source,
                    delay,
                    last_failure
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(AppError::unavailable(
            &request.source,
            format!(
                "{} failed after {} attempts: {}",
                request.url, attempts, last_failure
            ),
        ))
    }

    /// Fetch a page through the external rendering collaborator.
    ///
    /// Unavailability of the collaborator is a `SourceUnavailable`
    /// condition for the requesting source, never fatal to the cycle.
    pub async fn fetch_rendered(&self, source: &str, url: &str) -> Result<String> {
        let limiter = self.limiter(source);
        let _permit = limiter
            .acquire_owned()
            .await
            .map_err(|e| AppError::unavailable(source, e))?;

        match &self.renderer {
            Some(renderer) => renderer
                .render(url)
                .await
                .map_err(|e| AppError::unavailable(source, e)),
            None => Err(AppError::unavailable(
                source,
                "no rendering service configured",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher that fails with the scripted statuses before succeeding.
    struct FlakyFetcher {
        statuses: Vec<u16>,
        calls: AtomicUsize,
    }

    impl FlakyFetcher {
        fn new(statuses: Vec<u16>) -> Self {
            Self {
                statuses,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        async fn get(&self, _request: &FetchRequest) -> Result<FetchResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let status = self.statuses.get(call).copied().unwrap_or(200);
            Ok(FetchResponse {
                status,
                body: format!("attempt {}", call),
                headers: Vec::new(),
            })
        }
    }

    fn quick_config() -> FetchConfig {
        FetchConfig {
            max_retry_attempts: 3,
            retry_base_delay_ms: 1,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_retries_5xx_then_succeeds() {
        let fetcher = Arc::new(FlakyFetcher::new(vec![500, 502, 200]));
        let executor = FetchExecutor::new(fetcher.clone(), None, quick_config());

        let response = executor
            .fetch(FetchRequest::new("test", "https://example.com"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_unavailable() {
        let fetcher = Arc::new(FlakyFetcher::new(vec![500, 500, 500, 500]));
        let executor = FetchExecutor::new(fetcher, None, quick_config());

        let err = executor
            .fetch(FetchRequest::new("test", "https://example.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_non_retryable_status_returned_to_caller() {
        let fetcher = Arc::new(FlakyFetcher::new(vec![404]));
        let executor = FetchExecutor::new(fetcher.clone(), None, quick_config());

        let response = executor
            .fetch(FetchRequest::new("test", "https://example.com"))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_renderer_is_unavailable() {
        let fetcher = Arc::new(FlakyFetcher::new(vec![]));
        let executor = FetchExecutor::new(fetcher, None, quick_config());

        let err = executor
            .fetch_rendered("aquamanga", "https://example.com")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SourceUnavailable { .. }));
    }

    #[test]
    fn test_retryable_status_classification() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }
}
