//! # Conduit Core
//!
//! Resilience layer for sourcing content resources from a remote REST API
//! instead of, or alongside, the local database.
//!
//! ## Overview
//!
//! - **Resource routing**: each resource name resolves to `database` or `api`
//! - **Credential management**: OAuth2 client credentials, static JWT or API key
//! - **Response cache**: per-resource TTL cache for successful GETs
//! - **Retry** with capped exponential backoff
//! - **Circuit breaker** per resource group
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Token manager and credential strategies |
//! | [`cache`] | TTL response cache and cache keys |
//! | [`circuit_breaker`] | Per-group circuit breakers |
//! | [`client`] | API client façade |
//! | [`config`] | `dataSource` configuration (TOML/JSON) |
//! | [`error`] | Error taxonomy |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`retry`] | Backoff schedule and retry loop |
//! | [`routing`] | Resource to backend routing |
//! | [`runtime`] | Process-wide wiring |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit_core::{ConduitConfig, DataSourceRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConduitConfig::load_from_file("conduit.toml")?;
//!     let mut runtime = DataSourceRuntime::from_env(config.data_source)?;
//!     runtime.start_sweeper();
//!
//!     if let Some(client) = runtime.client_for("portfolio")? {
//!         let items = client.get("/portfolio", &[]).await?;
//!         println!("{items}");
//!     }
//!
//!     runtime.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Resource Router │── database ──▶ (local repositories)
//! └────────┬────────┘
//!          │ api
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │   API Client    │────▶│  Response Cache  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Token Manager  │────▶│ Token endpoint   │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Retry Engine   │────▶│ Circuit Breaker  │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  HTTP Client    │
//! │  (reqwest)      │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every call returns [`ApiError`]. Transient failures are retried inside the
//! client; what reaches the caller is final.
//!
//! ```rust
//! use conduit_core::ApiError;
//!
//! fn describe(error: &ApiError) -> String {
//!     match error {
//!         ApiError::CircuitOpen { .. } | ApiError::Network { .. } => error.public_message(),
//!         ApiError::Http { status, .. } if *status == 404 => String::from("not found"),
//!         other => other.public_message(),
//!     }
//! }
//!
//! assert_eq!(
//!     describe(&ApiError::circuit_open("contacts")),
//!     "service temporarily unavailable"
//! );
//! ```
//!
//! ## Security
//!
//! - Credentials are read from environment variables only
//! - `Debug` output of credentials and auth headers is redacted
//! - End-user messages never carry remote error bodies

pub mod auth;
pub mod cache;
pub mod circuit_breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod http_client;
pub mod retry;
pub mod routing;
pub mod runtime;

// Credentials
pub use auth::{Credential, CredentialKind, OAuth2Credentials, TokenManager, TokenStatus};

// Caching
pub use cache::{cache_key, CacheMode, CacheStats, CachedResponse, ResponseCache};

// Circuit breaker
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitSnapshot, CircuitState,
};

// Client façade
pub use client::{
    resource_group, ApiClient, ApiClientBuilder, ApiRequest, ApiResponse, Fallback,
    RequestOptions, ResponseOrigin,
};

// Configuration
pub use config::{
    ApiSettings, CacheSettings, CircuitBreakerSettings, ConduitConfig, DataSourceConfig, Provider,
    RetrySettings,
};

// Error types
pub use error::{ApiError, ConfigError, SERVICE_UNAVAILABLE_MESSAGE};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};

// Retry logic
pub use retry::RetryConfig;

// Routing types
pub use routing::{Backend, DataSourceMode, ResourceRouter, DEFAULT_KNOWN_RESOURCES};

// Runtime
pub use runtime::DataSourceRuntime;
