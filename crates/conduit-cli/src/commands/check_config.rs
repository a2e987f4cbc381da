use conduit_core::{Backend, ConduitConfig, Credential, DataSourceRuntime, RetryConfig};
use serde_json::json;

use crate::error::CliError;

use super::CommandResult;

/// Validate the file and the environment together and report the effective policy.
pub fn run(config: &ConduitConfig) -> Result<CommandResult, CliError> {
    let source = &config.data_source;
    let runtime = DataSourceRuntime::from_env(source.clone())?;
    let router = runtime.router();

    let retry = RetryConfig::from(&source.api.retry);
    let delays_ms = retry
        .delays()
        .iter()
        .map(|delay| u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
        .collect::<Vec<_>>();

    let credential = Credential::from_env()?.map(|credential| credential.kind());
    let base_url = source.api.resolve_base_url(|name| std::env::var(name).ok());

    let mut result = CommandResult::ok(json!({
        "provider": source.provider.to_string(),
        "api_resources": router.resources_on(Backend::Api),
        "database_resources": router.resources_on(Backend::Database),
        "api": {
            "base_url": base_url,
            "credential": credential,
            "timeout_ms": source.api.timeout,
        },
        "retry": {
            "max_attempts": retry.max_attempts,
            "delays_ms": delays_ms,
        },
        "circuit_breaker": {
            "enabled": source.api.circuit_breaker.enabled,
            "failure_threshold": source.api.circuit_breaker.failure_threshold,
            "reset_timeout_ms": source.api.circuit_breaker.reset_timeout,
        },
        "cache": {
            "enabled": source.api.cache.enabled,
            "default_ttl_secs": source.api.cache.default_ttl,
            "ttl_secs": source.api.cache.ttl,
            "sweep_interval_secs": source.api.cache.sweep_interval,
        },
    }));

    if router.uses_api() {
        let uncached = router
            .resources_on(Backend::Api)
            .into_iter()
            .filter(|name| source.api.cache.ttl_for(name).is_zero())
            .collect::<Vec<_>>();
        if !uncached.is_empty() {
            result = result.with_warning(format!(
                "API resources without a cache TTL: {}",
                uncached.join(", ")
            ));
        }
    }

    Ok(result)
}
