//! # Token Manager
//!
//! Supplies the `Authorization` (or API key) header for outbound calls.
//!
//! Three credential strategies exist; exactly one is active per process:
//!
//! | Strategy | Environment | Header |
//! |----------|-------------|--------|
//! | OAuth2 client credentials | `API_CLIENT_ID`, `API_CLIENT_SECRET`, `API_TOKEN_URL`, `API_TOKEN_REFRESH_BUFFER` | `Authorization: Bearer <access token>` |
//! | Static JWT | `API_JWT_TOKEN` | `Authorization: Bearer <jwt>` |
//! | Static API key | `API_KEY` | `X-API-Key: <key>` |
//!
//! ## OAuth2 refresh
//!
//! ```text
//!  caller A ──┐                       ┌──▶ token endpoint (one grant)
//!  caller B ──┼──▶ read lock: fresh? ─┤
//!  caller C ──┘        │ no           └──▶ write lock, re-check, grant, replace
//!                      ▼
//!               callers queued on the write lock reuse the new token
//! ```
//!
//! The token is fetched lazily, refreshed once `now >= expiry - buffer`, and
//! replaced wholesale on every refresh.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{ApiError, ConfigError};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, DEFAULT_TIMEOUT_MS};

/// Refresh this long before the access token expires unless configured otherwise.
pub const DEFAULT_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Longest token lifetime honored from a grant response; larger `expires_in`
/// values are clamped to it.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3_600;

/// Header used by the static API key strategy.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// OAuth2 client-credentials settings.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuth2Credentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_buffer: Duration,
}

impl Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_buffer", &self.refresh_buffer)
            .finish()
    }
}

/// The credential strategy chosen at startup.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    OAuth2(OAuth2Credentials),
    Jwt(String),
    ApiKey(String),
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OAuth2(oauth) => f.debug_tuple("OAuth2").field(oauth).finish(),
            Self::Jwt(_) => f.write_str("Jwt(<redacted>)"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

/// Credential strategy name, safe to log and print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    OAuth2,
    Jwt,
    ApiKey,
}

impl Credential {
    pub const fn kind(&self) -> CredentialKind {
        match self {
            Self::OAuth2(_) => CredentialKind::OAuth2,
            Self::Jwt(_) => CredentialKind::Jwt,
            Self::ApiKey(_) => CredentialKind::ApiKey,
        }
    }

    /// Read the credential strategy from the process environment.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the credential strategy from a variable lookup.
    ///
    /// OAuth2 wins when all three of its variables are present, then the
    /// static JWT, then the static API key. A partial OAuth2 setup is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let client_id = read("API_CLIENT_ID");
        let client_secret = read("API_CLIENT_SECRET");
        let token_url = read("API_TOKEN_URL");

        match (client_id, client_secret, token_url) {
            (Some(client_id), Some(client_secret), Some(token_url)) => {
                let refresh_buffer = match read("API_TOKEN_REFRESH_BUFFER") {
                    Some(raw) => Duration::from_secs(raw.trim().parse::<u64>().map_err(|_| {
                        ConfigError::InvalidValue {
                            name: String::from("API_TOKEN_REFRESH_BUFFER"),
                            reason: format!("expected whole seconds, got '{raw}'"),
                        }
                    })?),
                    None => DEFAULT_REFRESH_BUFFER,
                };

                return Ok(Some(Self::OAuth2(OAuth2Credentials {
                    token_url,
                    client_id,
                    client_secret,
                    refresh_buffer,
                })));
            }
            (None, None, None) => {}
            _ => {
                return Err(ConfigError::InvalidValue {
                    name: String::from("API_CLIENT_ID/API_CLIENT_SECRET/API_TOKEN_URL"),
                    reason: String::from("OAuth2 requires all three variables"),
                });
            }
        }

        if let Some(jwt) = read("API_JWT_TOKEN") {
            return Ok(Some(Self::Jwt(jwt)));
        }

        Ok(read("API_KEY").map(Self::ApiKey))
    }
}

/// A granted OAuth2 access token.
#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn needs_refresh(&self, buffer: Duration) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) <= buffer
    }

    fn remaining_secs(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrantResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

const fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// Credential state reported by [`TokenManager::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStatus {
    pub strategy: Option<CredentialKind>,
    pub token_cached: bool,
    pub expires_in_secs: Option<u64>,
}

/// Process-wide credential provider for outbound calls.
pub struct TokenManager {
    credential: Option<Credential>,
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
    token: RwLock<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(credential: Option<Credential>, http_client: Arc<dyn HttpClient>) -> Self {
        if let Some(credential) = &credential {
            info!(strategy = ?credential.kind(), "credential strategy configured");
        }

        Self {
            credential,
            http_client,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            token: RwLock::new(None),
        }
    }

    /// Bound the token grant request by `timeout_ms`.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn credential_kind(&self) -> Option<CredentialKind> {
        self.credential.as_ref().map(Credential::kind)
    }

    /// Header to attach to the next outbound request.
    ///
    /// Fails with [`ApiError::Auth`] when no strategy is configured or the
    /// OAuth2 grant fails. A failed grant leaves no token behind.
    pub async fn auth_header(&self) -> Result<HttpAuth, ApiError> {
        match &self.credential {
            None => Err(ApiError::auth("no credential strategy configured")),
            Some(Credential::Jwt(token)) => Ok(HttpAuth::BearerToken(token.clone())),
            Some(Credential::ApiKey(key)) => Ok(HttpAuth::Header {
                name: String::from(API_KEY_HEADER),
                value: key.clone(),
            }),
            Some(Credential::OAuth2(oauth)) => self
                .access_token(oauth)
                .await
                .map(HttpAuth::BearerToken),
        }
    }

    /// Drop the cached OAuth2 token so the next call performs a new grant.
    pub async fn invalidate(&self) {
        let mut guard = self.token.write().await;
        if guard.take().is_some() {
            debug!("discarded cached access token");
        }
    }

    pub async fn token_status(&self) -> TokenStatus {
        let guard = self.token.read().await;
        TokenStatus {
            strategy: self.credential_kind(),
            token_cached: guard.is_some(),
            expires_in_secs: guard.as_ref().map(AccessToken::remaining_secs),
        }
    }

    async fn access_token(&self, oauth: &OAuth2Credentials) -> Result<String, ApiError> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if !token.needs_refresh(oauth.refresh_buffer) {
                    return Ok(token.value.clone());
                }
            }
        }

        let mut guard = self.token.write().await;

        // Another caller may have refreshed while we waited for the write lock.
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh(oauth.refresh_buffer) {
                return Ok(token.value.clone());
            }
        }

        let token = self.grant(oauth).await?;
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    async fn grant(&self, oauth: &OAuth2Credentials) -> Result<AccessToken, ApiError> {
        let body = format!(
            "grant_type=client_credentials&client_id={}&client_secret={}",
            urlencoding::encode(&oauth.client_id),
            urlencoding::encode(&oauth.client_secret),
        );
        let request = HttpRequest::post(&oauth.token_url)
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_header("accept", "application/json")
            .with_body(body)
            .with_timeout_ms(self.timeout_ms);

        let requested_at = Instant::now();
        let response = self.http_client.execute(request).await.map_err(|error| {
            warn!(error = %error, "token grant request failed");
            ApiError::auth(format!("token request failed: {}", error.message()))
        })?;

        if !response.is_success() {
            warn!(status = response.status, "token endpoint rejected grant");
            return Err(ApiError::auth(format!(
                "token endpoint returned HTTP {}",
                response.status
            )));
        }

        let grant: TokenGrantResponse = serde_json::from_str(&response.body)
            .map_err(|error| ApiError::auth(format!("malformed token response: {error}")))?;

        if grant.access_token.is_empty() {
            return Err(ApiError::auth("token endpoint returned an empty access token"));
        }

        info!(expires_in_secs = grant.expires_in, "obtained access token");
        let lifetime = Duration::from_secs(grant.expires_in).min(MAX_TOKEN_LIFETIME);
        Ok(AccessToken {
            value: grant.access_token,
            expires_at: requested_at
                .checked_add(lifetime)
                .unwrap_or(requested_at),
        })
    }
}

impl Debug for TokenManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("credential", &self.credential)
            .field("timeout_ms", &self.timeout_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpResponse};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TokenEndpoint {
        status: u16,
        expires_in: u64,
        latency: Duration,
        grants: AtomicU32,
    }

    impl TokenEndpoint {
        fn new(expires_in: u64) -> Self {
            Self {
                status: 200,
                expires_in,
                latency: Duration::from_millis(50),
                grants: AtomicU32::new(0),
            }
        }

        fn grants(&self) -> u32 {
            self.grants.load(Ordering::SeqCst)
        }
    }

    impl HttpClient for TokenEndpoint {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            Box::pin(async move {
                let grant = self.grants.fetch_add(1, Ordering::SeqCst) + 1;
                assert!(request
                    .body
                    .as_deref()
                    .is_some_and(|body| body.starts_with("grant_type=client_credentials")));
                tokio::time::sleep(self.latency).await;
                let body = format!(
                    r#"{{"access_token":"token-{grant}","expires_in":{},"token_type":"Bearer"}}"#,
                    self.expires_in
                );
                Ok(HttpResponse::new(self.status, body))
            })
        }
    }

    fn oauth(buffer_secs: u64) -> Credential {
        Credential::OAuth2(OAuth2Credentials {
            token_url: String::from("https://auth.example.test/token"),
            client_id: String::from("site"),
            client_secret: String::from("s3cret"),
            refresh_buffer: Duration::from_secs(buffer_secs),
        })
    }

    fn bearer(auth: HttpAuth) -> String {
        match auth {
            HttpAuth::BearerToken(token) => token,
            other => panic!("expected bearer auth, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_fetched_lazily_and_reused() {
        let endpoint = Arc::new(TokenEndpoint::new(3_600));
        let manager = TokenManager::new(Some(oauth(300)), endpoint.clone());

        assert_eq!(endpoint.grants(), 0);
        assert_eq!(bearer(manager.auth_header().await.expect("grant")), "token-1");
        assert_eq!(bearer(manager.auth_header().await.expect("cached")), "token-1");
        assert_eq!(endpoint.grants(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_inside_buffer_window_only() {
        let endpoint = Arc::new(TokenEndpoint::new(1_200));
        let manager = TokenManager::new(Some(oauth(300)), endpoint.clone());
        manager.auth_header().await.expect("grant");

        // 1000 s of validity left: outside the 300 s buffer.
        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(bearer(manager.auth_header().await.expect("cached")), "token-1");

        // 200 s of validity left: inside the buffer.
        tokio::time::advance(Duration::from_secs(800)).await;
        assert_eq!(bearer(manager.auth_header().await.expect("refresh")), "token-2");
        assert_eq!(endpoint.grants(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_expires_in_is_clamped() {
        let endpoint = Arc::new(TokenEndpoint::new(u64::MAX));
        let manager = TokenManager::new(Some(oauth(300)), endpoint.clone());

        assert_eq!(bearer(manager.auth_header().await.expect("grant")), "token-1");
        let status = manager.token_status().await;
        assert!(status.token_cached);
        // The grant took 50 ms of the clamped lifetime.
        assert_eq!(status.expires_in_secs, Some(MAX_TOKEN_LIFETIME.as_secs() - 1));

        assert_eq!(bearer(manager.auth_header().await.expect("cached")), "token-1");
        assert_eq!(endpoint.grants(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_refresh_buffer_refreshes_every_call() {
        let endpoint = Arc::new(TokenEndpoint::new(3_600));
        let manager = TokenManager::new(Some(oauth(u64::MAX)), endpoint.clone());

        assert_eq!(bearer(manager.auth_header().await.expect("grant")), "token-1");
        assert_eq!(bearer(manager.auth_header().await.expect("regrant")), "token-2");
        assert_eq!(endpoint.grants(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_grant() {
        let endpoint = Arc::new(TokenEndpoint::new(3_600));
        let manager = Arc::new(TokenManager::new(Some(oauth(300)), endpoint.clone()));

        let (a, b, c) = tokio::join!(
            manager.auth_header(),
            manager.auth_header(),
            manager.auth_header()
        );

        assert_eq!(bearer(a.expect("a")), "token-1");
        assert_eq!(bearer(b.expect("b")), "token-1");
        assert_eq!(bearer(c.expect("c")), "token-1");
        assert_eq!(endpoint.grants(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_grant_is_not_cached() {
        let endpoint = Arc::new(TokenEndpoint {
            status: 401,
            ..TokenEndpoint::new(3_600)
        });
        let manager = TokenManager::new(Some(oauth(300)), endpoint.clone());

        let error = manager.auth_header().await.expect_err("grant must fail");
        assert!(matches!(error, ApiError::Auth(_)));
        assert!(!manager.token_status().await.token_cached);

        manager.auth_header().await.expect_err("still failing");
        assert_eq!(endpoint.grants(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_a_new_grant() {
        let endpoint = Arc::new(TokenEndpoint::new(3_600));
        let manager = TokenManager::new(Some(oauth(300)), endpoint.clone());

        manager.auth_header().await.expect("grant");
        manager.invalidate().await;
        assert_eq!(bearer(manager.auth_header().await.expect("regrant")), "token-2");
    }

    #[tokio::test]
    async fn static_strategies_never_touch_the_network() {
        let endpoint = Arc::new(TokenEndpoint::new(3_600));

        let jwt = TokenManager::new(Some(Credential::Jwt(String::from("jwt-abc"))), endpoint.clone());
        assert_eq!(bearer(jwt.auth_header().await.expect("jwt")), "jwt-abc");

        let key = TokenManager::new(Some(Credential::ApiKey(String::from("k-1"))), endpoint.clone());
        assert_eq!(
            key.auth_header().await.expect("api key"),
            HttpAuth::Header {
                name: String::from(API_KEY_HEADER),
                value: String::from("k-1"),
            }
        );

        assert_eq!(endpoint.grants(), 0);
    }

    #[tokio::test]
    async fn missing_strategy_is_an_auth_error() {
        let manager = TokenManager::new(None, Arc::new(TokenEndpoint::new(60)));
        let error = manager.auth_header().await.expect_err("no strategy");
        assert!(matches!(error, ApiError::Auth(_)));
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn env_resolution_prefers_oauth_then_jwt_then_key() {
        let credential = Credential::from_lookup(lookup(&[
            ("API_CLIENT_ID", "id"),
            ("API_CLIENT_SECRET", "secret"),
            ("API_TOKEN_URL", "https://auth.example.test/token"),
            ("API_TOKEN_REFRESH_BUFFER", "120"),
            ("API_JWT_TOKEN", "jwt"),
        ]))
        .expect("valid env");
        match credential {
            Some(Credential::OAuth2(oauth)) => {
                assert_eq!(oauth.refresh_buffer, Duration::from_secs(120));
            }
            other => panic!("expected oauth, got {other:?}"),
        }

        let credential = Credential::from_lookup(lookup(&[("API_JWT_TOKEN", "jwt"), ("API_KEY", "k")]))
            .expect("valid env");
        assert_eq!(credential.map(|c| c.kind()), Some(CredentialKind::Jwt));

        let credential = Credential::from_lookup(lookup(&[("API_KEY", "k")])).expect("valid env");
        assert_eq!(credential.map(|c| c.kind()), Some(CredentialKind::ApiKey));

        assert_eq!(Credential::from_lookup(lookup(&[])).expect("empty env"), None);
    }

    #[test]
    fn partial_oauth_env_is_rejected() {
        let error = Credential::from_lookup(lookup(&[("API_CLIENT_ID", "id")]))
            .expect_err("incomplete oauth");
        assert!(error.to_string().contains("OAuth2"));

        let error = Credential::from_lookup(lookup(&[
            ("API_CLIENT_ID", "id"),
            ("API_CLIENT_SECRET", "secret"),
            ("API_TOKEN_URL", "https://auth.example.test/token"),
            ("API_TOKEN_REFRESH_BUFFER", "soon"),
        ]))
        .expect_err("bad buffer");
        assert!(error.to_string().contains("API_TOKEN_REFRESH_BUFFER"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", oauth(300));
        assert!(!rendered.contains("s3cret"));
        assert!(!format!("{:?}", Credential::ApiKey(String::from("k-1"))).contains("k-1"));
    }
}
