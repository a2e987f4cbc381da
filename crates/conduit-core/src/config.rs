//! # Data Source Configuration
//!
//! Typed view of the `dataSource` table. Files may be TOML or JSON; keys are
//! camelCase in both.
//!
//! ```toml
//! [dataSource]
//! provider = "hybrid"
//! knownResources = ["users", "portfolio", "contacts"]
//!
//! [dataSource.resources]
//! portfolio = "api"
//! users = "database"
//!
//! [dataSource.api]
//! baseUrl = "https://cms.example.com/v1"
//! timeout = 30000                     # ms, per attempt
//!
//! [dataSource.api.retry]
//! maxAttempts = 3
//! initialDelay = 1000                 # ms
//! maxDelay = 10000                    # ms
//! backoffMultiplier = 2.0
//!
//! [dataSource.api.circuitBreaker]
//! enabled = true
//! failureThreshold = 5
//! resetTimeout = 60000                # ms
//!
//! [dataSource.api.cache]
//! enabled = true
//! defaultTtl = 0                      # seconds, 0 = never cache
//! sweepInterval = 300                 # seconds
//! ttl = { portfolio = 180 }
//! ```
//!
//! `API_BASE_URL` in the environment wins over `api.baseUrl`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::http_client::DEFAULT_TIMEOUT_MS;
use crate::retry::RetryConfig;
use crate::routing::Backend;

/// Root document holding the `dataSource` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConduitConfig {
    #[serde(default)]
    pub data_source: DataSourceConfig,
}

impl ConduitConfig {
    /// Load a TOML or JSON file, picking the parser from the extension.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let config = match extension.as_str() {
            "toml" => Self::from_toml_str(&raw)?,
            "json" => Self::from_json_str(&raw)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_owned())),
        };

        debug!(path = %path.display(), provider = %config.data_source.provider, "loaded data source config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.data_source.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.data_source.validate()?;
        Ok(config)
    }
}

/// Routing provider selected for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Database,
    Api,
    Hybrid,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Database => write!(f, "database"),
            Provider::Api => write!(f, "api"),
            Provider::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// The `dataSource` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    #[serde(default)]
    pub provider: Provider,

    /// Per-resource backend entries. Overrides in `database`/`api` mode,
    /// the complete routing table in `hybrid` mode.
    #[serde(default)]
    pub resources: BTreeMap<String, Backend>,

    /// Replaces the built-in list of content resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_resources: Option<Vec<String>>,

    #[serde(default)]
    pub api: ApiSettings,
}

impl DataSourceConfig {
    /// Reject values the runtime cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider == Provider::Hybrid && self.resources.is_empty() {
            return Err(invalid(
                "dataSource.resources",
                "hybrid provider requires explicit per-resource entries",
            ));
        }

        if let Some(known) = &self.known_resources {
            if let Some(blank) = known.iter().find(|name| name.trim().is_empty()) {
                return Err(invalid(
                    "dataSource.knownResources",
                    format!("resource names must not be blank (got '{blank}')"),
                ));
            }
        }

        if self.api.timeout == 0 {
            return Err(invalid("dataSource.api.timeout", "must be greater than zero"));
        }

        let retry = &self.api.retry;
        if retry.max_attempts == 0 {
            return Err(invalid("dataSource.api.retry.maxAttempts", "must be at least 1"));
        }
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "dataSource.api.retry.backoffMultiplier",
                "must be a finite number >= 1",
            ));
        }
        if retry.max_delay < retry.initial_delay {
            return Err(invalid(
                "dataSource.api.retry.maxDelay",
                "must not be smaller than initialDelay",
            ));
        }

        if self.api.circuit_breaker.failure_threshold == 0 {
            return Err(invalid(
                "dataSource.api.circuitBreaker.failureThreshold",
                "must be at least 1",
            ));
        }

        if self.api.cache.sweep_interval == 0 {
            return Err(invalid(
                "dataSource.api.cache.sweepInterval",
                "must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_owned(),
        reason: reason.into(),
    }
}

/// The `dataSource.api` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-attempt request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: default_timeout_ms(),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl ApiSettings {
    /// Base URL with `API_BASE_URL` taking precedence over the file.
    pub fn resolve_base_url<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("API_BASE_URL")
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.base_url.clone())
            .map(|url| url.trim_end_matches('/').to_owned())
    }
}

/// The `dataSource.api.retry` table. Delays are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay: u64,
    pub max_delay: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: 1_000,
            max_delay: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay),
            max_delay: Duration::from_millis(settings.max_delay),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

/// The `dataSource.api.circuitBreaker` table. `resetTimeout` is milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub reset_timeout: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            reset_timeout: 60_000,
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        CircuitBreakerConfig {
            enabled: settings.enabled,
            failure_threshold: settings.failure_threshold,
            reset_timeout: Duration::from_millis(settings.reset_timeout),
        }
    }
}

/// The `dataSource.api.cache` table. TTLs and the sweep interval are seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: BTreeMap<String, u64>,
    pub default_ttl: u64,
    pub sweep_interval: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: BTreeMap::new(),
            default_ttl: 0,
            sweep_interval: 300,
        }
    }
}

impl CacheSettings {
    /// TTL applied to GET responses of `resource`. Zero disables caching.
    pub fn ttl_for(&self, resource: &str) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let seconds = self.ttl.get(resource).copied().unwrap_or(self.default_ttl);
        Duration::from_secs(seconds)
    }

    pub fn sweep_every(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HYBRID_TOML: &str = r#"
[dataSource]
provider = "hybrid"

[dataSource.resources]
portfolio = "api"
users = "database"

[dataSource.api]
baseUrl = "https://cms.example.test/v1/"
timeout = 5000

[dataSource.api.retry]
maxAttempts = 4
initialDelay = 250

[dataSource.api.cache]
ttl = { portfolio = 180 }
"#;

    #[test]
    fn parses_toml_with_defaults_for_missing_keys() {
        let config = ConduitConfig::from_toml_str(HYBRID_TOML).expect("valid toml");
        let source = &config.data_source;

        assert_eq!(source.provider, Provider::Hybrid);
        assert_eq!(source.resources.get("portfolio"), Some(&Backend::Api));
        assert_eq!(source.api.timeout, 5_000);
        assert_eq!(source.api.retry.max_attempts, 4);
        assert_eq!(source.api.retry.initial_delay, 250);
        assert_eq!(source.api.retry.max_delay, 10_000);
        assert_eq!(source.api.circuit_breaker, CircuitBreakerSettings::default());
        assert_eq!(source.api.cache.ttl_for("portfolio"), Duration::from_secs(180));
        assert_eq!(source.api.cache.ttl_for("users"), Duration::ZERO);
        assert_eq!(source.api.cache.sweep_every(), Duration::from_secs(300));
    }

    #[test]
    fn parses_equivalent_json() {
        let config = ConduitConfig::from_json_str(
            r#"{
                "dataSource": {
                    "provider": "api",
                    "knownResources": ["portfolio", "blog"],
                    "api": {
                        "circuitBreaker": { "failureThreshold": 2, "resetTimeout": 1000 },
                        "cache": { "defaultTtl": 60 }
                    }
                }
            }"#,
        )
        .expect("valid json");
        let source = &config.data_source;

        assert_eq!(source.provider, Provider::Api);
        assert_eq!(
            source.known_resources.as_deref(),
            Some(&[String::from("portfolio"), String::from("blog")][..])
        );

        let breaker = CircuitBreakerConfig::from(&source.api.circuit_breaker);
        assert!(breaker.enabled);
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(1));
        assert_eq!(source.api.cache.ttl_for("blog"), Duration::from_secs(60));
    }

    #[test]
    fn retry_settings_convert_to_engine_config() {
        let retry = RetryConfig::from(&RetrySettings::default());
        assert_eq!(retry, RetryConfig::default());
    }

    #[test]
    fn disabled_cache_yields_zero_ttl() {
        let settings = CacheSettings {
            enabled: false,
            ttl: BTreeMap::from([(String::from("portfolio"), 180)]),
            ..CacheSettings::default()
        };
        assert_eq!(settings.ttl_for("portfolio"), Duration::ZERO);
    }

    #[test]
    fn hybrid_without_entries_is_rejected() {
        let error = ConduitConfig::from_toml_str("[dataSource]\nprovider = \"hybrid\"\n")
            .expect_err("hybrid needs entries");
        assert!(error.to_string().contains("dataSource.resources"));
    }

    #[test]
    fn invalid_retry_values_are_rejected() {
        let error = ConduitConfig::from_toml_str(
            "[dataSource.api.retry]\nbackoffMultiplier = 0.5\n",
        )
        .expect_err("multiplier below one");
        assert!(error.to_string().contains("backoffMultiplier"));

        let error =
            ConduitConfig::from_toml_str("[dataSource.api.retry]\nmaxAttempts = 0\n")
                .expect_err("zero attempts");
        assert!(error.to_string().contains("maxAttempts"));
    }

    #[test]
    fn unknown_backend_name_fails_to_parse() {
        let error = ConduitConfig::from_toml_str(
            "[dataSource]\nprovider = \"api\"\n[dataSource.resources]\nblog = \"redis\"\n",
        )
        .expect_err("unknown backend");
        assert!(matches!(error, ConfigError::Toml(_)));
    }

    #[test]
    fn env_base_url_wins_over_file() {
        let config = ConduitConfig::from_toml_str(HYBRID_TOML).expect("valid toml");
        let api = &config.data_source.api;

        assert_eq!(
            api.resolve_base_url(|_| None).as_deref(),
            Some("https://cms.example.test/v1")
        );
        assert_eq!(
            api.resolve_base_url(|name| (name == "API_BASE_URL")
                .then(|| String::from("http://localhost:9000")))
            .as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn load_from_file_picks_parser_by_extension() {
        let mut toml_file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        toml_file
            .write_all(HYBRID_TOML.as_bytes())
            .expect("write toml");
        let config = ConduitConfig::load_from_file(toml_file.path()).expect("load toml");
        assert_eq!(config.data_source.provider, Provider::Hybrid);

        let mut json_file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("temp file");
        json_file
            .write_all(br#"{"dataSource":{"provider":"database"}}"#)
            .expect("write json");
        let config = ConduitConfig::load_from_file(json_file.path()).expect("load json");
        assert_eq!(config.data_source.provider, Provider::Database);

        let yaml_file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        let error = ConduitConfig::load_from_file(yaml_file.path()).expect_err("yaml");
        assert!(matches!(error, ConfigError::UnsupportedFormat(ext) if ext == "yaml"));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.toml");
        let error = ConduitConfig::load_from_file(&path).expect_err("missing file");
        assert!(matches!(error, ConfigError::Io { .. }));
        assert!(error.to_string().contains("absent.toml"));
    }
}
