//! Process-wide wiring.
//!
//! [`DataSourceRuntime`] is built once at startup. It owns the router, the
//! response cache, the breaker registry and the token manager, and hands the
//! same instances to the [`ApiClient`]. Nothing here is a global.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::{Credential, TokenManager};
use crate::cache::ResponseCache;
use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::client::ApiClient;
use crate::config::DataSourceConfig;
use crate::error::ApiError;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::retry::RetryConfig;
use crate::routing::{Backend, ResourceRouter};

pub struct DataSourceRuntime {
    config: DataSourceConfig,
    router: Arc<ResourceRouter>,
    cache: ResponseCache,
    breakers: Arc<CircuitBreakerRegistry>,
    client: Option<Arc<ApiClient>>,
    sweeper: Option<JoinHandle<()>>,
}

impl DataSourceRuntime {
    /// Build from configuration and the process environment with the
    /// reqwest transport.
    pub fn from_env(config: DataSourceConfig) -> Result<Self, ApiError> {
        Self::build(
            config,
            |name| std::env::var(name).ok(),
            Arc::new(ReqwestHttpClient::new()),
        )
    }

    /// Build with an explicit environment lookup and transport.
    ///
    /// When any resource routes to the API, a base URL and a credential
    /// strategy are required; their absence is a startup error.
    pub fn build<F>(
        config: DataSourceConfig,
        lookup: F,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.validate()?;
        let router = Arc::new(ResourceRouter::from_config(&config)?);
        let cache = ResponseCache::new();
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::from(
            &config.api.circuit_breaker,
        )));

        let client = if router.uses_api() {
            let base_url = config.api.resolve_base_url(&lookup).ok_or_else(|| {
                ApiError::configuration(
                    "resources are routed to the API but no base URL is configured",
                )
            })?;
            let credential = Credential::from_lookup(&lookup)?.ok_or_else(|| {
                ApiError::configuration(
                    "resources are routed to the API but no credential strategy is configured",
                )
            })?;

            let tokens = Arc::new(
                TokenManager::new(Some(credential), http_client.clone())
                    .with_timeout_ms(config.api.timeout),
            );

            let client = ApiClient::builder(base_url)
                .with_http_client(http_client)
                .with_token_manager(tokens)
                .with_cache(cache.clone())
                .with_breakers(breakers.clone())
                .with_retry(RetryConfig::from(&config.api.retry))
                .with_cache_settings(config.api.cache.clone())
                .with_timeout_ms(config.api.timeout)
                .build()?;
            Some(Arc::new(client))
        } else {
            info!("no resources routed to the API, remote client disabled");
            None
        };

        Ok(Self {
            config,
            router,
            cache,
            breakers,
            client,
            sweeper: None,
        })
    }

    /// Start the periodic cache sweep. Must run inside a tokio runtime.
    pub fn start_sweeper(&mut self) {
        if self.sweeper.is_some() || self.client.is_none() || !self.config.api.cache.enabled {
            return;
        }
        let every = self.config.api.cache.sweep_every();
        info!(interval_secs = every.as_secs(), "starting cache sweeper");
        self.sweeper = Some(self.cache.spawn_sweeper(every));
    }

    pub fn config(&self) -> &DataSourceConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<ResourceRouter> {
        &self.router
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// The remote client, or a configuration error when nothing routes to it.
    pub fn client(&self) -> Result<&Arc<ApiClient>, ApiError> {
        self.client
            .as_ref()
            .ok_or_else(|| ApiError::configuration("no resources are routed to the API"))
    }

    /// Client serving `resource`, or `None` when it lives in the database.
    pub fn client_for(&self, resource: &str) -> Result<Option<&Arc<ApiClient>>, ApiError> {
        match self.router.resolve_backend(resource)? {
            Backend::Database => Ok(None),
            Backend::Api => self.client().map(Some),
        }
    }

    /// Stop background work.
    pub fn shutdown(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
            info!("cache sweeper stopped");
        }
    }
}

impl Drop for DataSourceRuntime {
    fn drop(&mut self) {
        if self.sweeper.is_some() {
            warn!("data source runtime dropped without shutdown");
            self.shutdown();
        }
    }
}
