//! # API Client
//!
//! Uniform call surface for resources routed to the remote API.
//!
//! ```text
//! request ──▶ GET? cache hit ──────────────────────────────▶ cached value
//!                │ miss / mutation
//!                ▼
//!           TokenManager::auth_header ── AuthError ───────▶ error
//!                │
//!                ▼
//!           RetryConfig::execute ─┬─ breaker open ────────▶ CircuitOpen
//!                │                └─ attempt (timeout) ──▶ transport
//!                ▼
//!           2xx GET: store with resource TTL
//!           2xx mutation: invalidate resource family
//! ```
//!
//! Failures are never replaced by cached data unless the caller opts into
//! [`Fallback::StaleCache`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{TokenManager, TokenStatus};
use crate::cache::{cache_key, normalize_path, CacheMode, CacheStats, CachedResponse, ResponseCache};
use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitSnapshot};
use crate::config::CacheSettings;
use crate::error::ApiError;
use crate::http_client::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient, DEFAULT_TIMEOUT_MS,
};
use crate::retry::RetryConfig;

/// Degraded-mode behavior a caller may opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fallback {
    /// Surface every failure.
    #[default]
    None,
    /// For GET, serve an expired but not yet swept cache entry when the
    /// remote is unavailable (open circuit or retryable failure).
    StaleCache,
}

/// Per-call options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestOptions {
    pub cache_mode: CacheMode,
    pub fallback: Fallback,
}

impl RequestOptions {
    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }
}

/// One call against the remote REST contract.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn with_params(mut self, params: &[(String, String)]) -> Self {
        self.params.extend_from_slice(params);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Move a query string written into `path` ahead of the explicit params,
    /// so `/portfolio?tag=rust` and `/portfolio` + `tag=rust` are the same call.
    pub fn split_inline_query(mut self) -> Self {
        let Some((path, query)) = self.path.split_once('?') else {
            return self;
        };

        let mut params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(name), decode_component(value))
            })
            .collect::<Vec<_>>();
        params.append(&mut self.params);

        self.path = path.to_owned();
        self.params = params;
        self
    }

    /// Resource group: the first segment of the path.
    pub fn group(&self) -> Result<String, ApiError> {
        resource_group(&self.path)
    }
}

/// Where the returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOrigin {
    Network,
    Cache,
    StaleCache,
}

/// Decoded response plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub origin: ResponseOrigin,
    pub data: Value,
}

/// `/portfolio/7` and `portfolio?x=1` both belong to `portfolio`.
pub fn resource_group(path: &str) -> Result<String, ApiError> {
    normalize_path(path)
        .trim_start_matches('/')
        .split(['/', '?'])
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::configuration(format!("request path '{path}' names no resource")))
}

/// Resilient client for the remote REST API.
pub struct ApiClient {
    base_url: String,
    http_client: Arc<dyn HttpClient>,
    tokens: Arc<TokenManager>,
    cache: ResponseCache,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryConfig,
    cache_settings: CacheSettings,
    timeout: Duration,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a call and return the decoded JSON body.
    pub async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let mut request = ApiRequest::new(method, path).with_params(params);
        request.body = body;
        self.request_with(request, RequestOptions::default())
            .await
            .map(|response| response.data)
    }

    /// Issue a call with explicit cache and fallback options.
    pub async fn request_with(
        &self,
        request: ApiRequest,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let request = request.split_inline_query();
        let group = request.group()?;
        let is_get = request.method == HttpMethod::Get;
        let key = cache_key(request.method, &request.path, &request.params);

        if is_get && options.cache_mode.reads() {
            if let Some(cached) = self.cache.get(&key) {
                debug!(group = %group, key = %key, "served from cache");
                return Ok(ApiResponse {
                    status: cached.status,
                    origin: ResponseOrigin::Cache,
                    data: decode_body(&cached.body)?,
                });
            }
        }

        match self.fetch(&request, &group).await {
            Ok(response) => {
                // The remote has applied the change even if its body is unreadable.
                if request.method.is_mutating() {
                    let removed = self.cache.invalidate_resource(&group);
                    debug!(group = %group, method = %request.method, removed, "mutation invalidated cache");
                }

                let data = decode_body(&response.body)?;

                if is_get && options.cache_mode.writes() {
                    let ttl = self.cache_settings.ttl_for(&group);
                    self.cache
                        .set(key, &group, CachedResponse::from_response(&response), ttl);
                }

                Ok(ApiResponse {
                    status: response.status,
                    origin: ResponseOrigin::Network,
                    data,
                })
            }
            Err(error) => {
                if error.status() == Some(401) {
                    self.tokens.invalidate().await;
                }

                let unavailable =
                    error.is_retryable() || matches!(error, ApiError::CircuitOpen { .. });
                if is_get && options.fallback == Fallback::StaleCache && unavailable {
                    if let Some(stale) = self.cache.get_stale(&key) {
                        warn!(group = %group, key = %key, error = %error, "serving stale cache entry");
                        return Ok(ApiResponse {
                            status: stale.status,
                            origin: ResponseOrigin::StaleCache,
                            data: decode_body(&stale.body)?,
                        });
                    }
                }

                Err(error)
            }
        }
    }

    pub async fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value, ApiError> {
        self.request(HttpMethod::Get, path, params, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(HttpMethod::Post, path, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(HttpMethod::Put, path, &[], Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(HttpMethod::Patch, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(HttpMethod::Delete, path, &[], None).await
    }

    /// Breaker snapshot for every group seen so far.
    pub fn circuit_state(&self) -> BTreeMap<String, CircuitSnapshot> {
        self.breakers.snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn token_status(&self) -> TokenStatus {
        self.tokens.token_status().await
    }

    async fn fetch(&self, request: &ApiRequest, group: &str) -> Result<HttpResponse, ApiError> {
        let auth = self.tokens.auth_header().await?;
        let breaker = self.breakers.breaker(group);

        let mut http_request = HttpRequest::new(request.method, self.url_for(request))
            .with_header("accept", "application/json")
            .with_auth(&auth)
            .with_timeout_ms(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX));
        if let Some(body) = &request.body {
            http_request = http_request.with_json_body(body);
        }

        let http_client = &self.http_client;
        let timeout = self.timeout;

        self.retry
            .execute(&breaker, |attempt| {
                let http_request = http_request.clone();
                async move {
                    debug!(group, attempt, method = %http_request.method, url = %http_request.url, "sending request");
                    let response = tokio::time::timeout(timeout, http_client.execute(http_request))
                        .await
                        .map_err(|_| {
                            ApiError::network(format!(
                                "request timed out after {}ms",
                                timeout.as_millis()
                            ))
                        })?
                        .map_err(ApiError::from)?;

                    if response.is_success() {
                        Ok(response)
                    } else {
                        Err(ApiError::http(response.status, response.body))
                    }
                }
            })
            .await
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        let mut url = format!("{}{}", self.base_url, normalize_path(&request.path));
        if !request.params.is_empty() {
            let query = request
                .params
                .iter()
                .map(|(name, value)| {
                    format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
                })
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_owned())
}

/// Empty bodies (204, bare DELETE acknowledgements) decode to `null`.
fn decode_body(body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|error| ApiError::Decode(error.to_string()))
}

/// Builder for [`ApiClient`]. Shared state not supplied here is created fresh.
pub struct ApiClientBuilder {
    base_url: String,
    http_client: Option<Arc<dyn HttpClient>>,
    tokens: Option<Arc<TokenManager>>,
    cache: Option<ResponseCache>,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    retry: RetryConfig,
    cache_settings: CacheSettings,
    timeout_ms: u64,
}

impl ApiClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: None,
            tokens: None,
            cache: None,
            breakers: None,
            retry: RetryConfig::default(),
            cache_settings: CacheSettings::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_breakers(mut self, breakers: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache_settings(mut self, cache_settings: CacheSettings) -> Self {
        self.cache_settings = cache_settings;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(ApiError::configuration(
                "API base URL is not configured (set API_BASE_URL or dataSource.api.baseUrl)",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ApiError::configuration("request timeout must be greater than zero"));
        }

        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(TokenManager::new(None, http_client.clone())));

        info!(
            base_url = %base_url,
            max_attempts = self.retry.max_attempts,
            timeout_ms = self.timeout_ms,
            "api client ready"
        );

        Ok(ApiClient {
            base_url,
            http_client,
            tokens,
            cache: self.cache.unwrap_or_default(),
            breakers: self.breakers.unwrap_or_default(),
            retry: self.retry,
            cache_settings: self.cache_settings,
            timeout: Duration::from_millis(self.timeout_ms),
        })
    }
}
