// Shared doubles for the behavior tests
#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use conduit_core::{
    ApiClient, CacheSettings, CircuitBreakerConfig, CircuitBreakerRegistry, Credential,
    HttpClient, HttpError, HttpRequest, HttpResponse, OAuth2Credentials, RetryConfig,
    TokenManager,
};

pub const BASE_URL: &str = "https://cms.example.test/v1";
pub const TOKEN_URL: &str = "https://auth.example.test/oauth/token";

type Responder = dyn Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync;

/// Scripted remote that records every request it receives.
pub struct RecordingHttpClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
    latency: Duration,
}

impl RecordingHttpClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Every resource call answers `status` with `body`.
    pub fn always(status: u16, body: &'static str) -> Self {
        Self::new(move |_| Ok(HttpResponse::new(status, body).with_header("content-type", "application/json")))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn recorded_requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .clone()
    }

    pub fn token_calls(&self) -> usize {
        self.recorded_requests()
            .iter()
            .filter(|request| request.url == TOKEN_URL)
            .count()
    }

    pub fn resource_calls(&self) -> usize {
        self.recorded_requests()
            .iter()
            .filter(|request| request.url != TOKEN_URL)
            .count()
    }

    pub fn last_resource_request(&self) -> Option<HttpRequest> {
        self.recorded_requests()
            .into_iter()
            .filter(|request| request.url != TOKEN_URL)
            .last()
    }
}

impl HttpClient for RecordingHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = (self.responder)(&request);
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .push(request);
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            response
        })
    }
}

/// Token endpoint answering with sequentially numbered tokens.
pub struct TokenMint {
    issued: AtomicU32,
    expires_in: u64,
}

impl TokenMint {
    pub fn new(expires_in: u64) -> Self {
        Self {
            issued: AtomicU32::new(0),
            expires_in,
        }
    }

    pub fn grant(&self) -> Result<HttpResponse, HttpError> {
        let number = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(HttpResponse::ok_json(format!(
            r#"{{"access_token":"token-{number}","expires_in":{},"token_type":"Bearer"}}"#,
            self.expires_in
        )))
    }
}

pub fn oauth_credential(refresh_buffer_secs: u64) -> Credential {
    Credential::OAuth2(OAuth2Credentials {
        token_url: String::from(TOKEN_URL),
        client_id: String::from("site-backend"),
        client_secret: String::from("client-secret"),
        refresh_buffer: Duration::from_secs(refresh_buffer_secs),
    })
}

pub fn api_key_credential() -> Credential {
    Credential::ApiKey(String::from("test-key"))
}

pub fn cache_ttls(entries: &[(&str, u64)]) -> CacheSettings {
    CacheSettings {
        ttl: entries
            .iter()
            .map(|(name, ttl)| ((*name).to_owned(), *ttl))
            .collect(),
        ..CacheSettings::default()
    }
}

pub fn breaker_config(failure_threshold: u32, reset_timeout_secs: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        enabled: true,
        failure_threshold,
        reset_timeout: Duration::from_secs(reset_timeout_secs),
    }
}

/// Client wired to `remote` with the given policies.
pub fn client_with(
    remote: Arc<RecordingHttpClient>,
    credential: Credential,
    retry: RetryConfig,
    breaker: CircuitBreakerConfig,
    cache: CacheSettings,
) -> ApiClient {
    let tokens = Arc::new(TokenManager::new(Some(credential), remote.clone()));
    ApiClient::builder(BASE_URL)
        .with_http_client(remote)
        .with_token_manager(tokens)
        .with_breakers(Arc::new(CircuitBreakerRegistry::new(breaker)))
        .with_retry(retry)
        .with_cache_settings(cache)
        .build()
        .expect("client should build")
}

pub fn resource_url(path: &str) -> String {
    format!("{BASE_URL}{path}")
}
