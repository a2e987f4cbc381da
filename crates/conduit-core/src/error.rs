use thiserror::Error;

/// Generic message shown to end users when the remote is unavailable.
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "service temporarily unavailable";

/// Errors surfaced by the API client and its resilience layers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Credential acquisition or refresh failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The breaker for `group` is open; no network attempt was made.
    #[error("circuit breaker is open for '{group}'")]
    CircuitOpen { group: String },

    /// Connection-level failure (refused, reset, DNS, timeout).
    #[error("network error: {message}")]
    Network { message: String },

    /// The remote answered with a non-2xx status.
    #[error("remote returned HTTP {status}")]
    Http { status: u16, body: String },

    /// Missing routing entry or credential strategy.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote answered 2xx but the body was not valid JSON.
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn circuit_open(group: impl Into<String>) -> Self {
        Self::CircuitOpen {
            group: group.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true when another attempt may succeed.
    ///
    /// Network failures, HTTP 429 and any 5xx are retryable. Every other
    /// HTTP status, auth, configuration and decode failures are terminal.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Http { status, .. } => *status == 429 || (*status >= 500 && *status <= 599),
            Self::Auth(_) | Self::CircuitOpen { .. } | Self::Configuration(_) | Self::Decode(_) => {
                false
            }
        }
    }

    /// HTTP status of the remote response, if the remote answered.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable machine-readable code used in CLI output and logs.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "api.auth",
            Self::CircuitOpen { .. } => "api.circuit_open",
            Self::Network { .. } => "api.network",
            Self::Http { .. } => "api.http",
            Self::Configuration(_) => "api.configuration",
            Self::Decode(_) => "api.decode",
        }
    }

    /// Message safe to show end users.
    ///
    /// Unavailability (open circuit, network exhaustion, 5xx, 429) collapses
    /// into [`SERVICE_UNAVAILABLE_MESSAGE`]; client errors keep their status only.
    pub fn public_message(&self) -> String {
        match self {
            Self::CircuitOpen { .. } | Self::Network { .. } => {
                String::from(SERVICE_UNAVAILABLE_MESSAGE)
            }
            Self::Http { .. } if self.is_retryable() => String::from(SERVICE_UNAVAILABLE_MESSAGE),
            Self::Http { status, .. } => format!("request rejected (HTTP {status})"),
            Self::Auth(_) | Self::Configuration(_) | Self::Decode(_) => {
                String::from("internal error")
            }
        }
    }
}

/// Errors raised while loading data source configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("unsupported config format '{0}', expected .toml or .json")]
    UnsupportedFormat(String),
}

impl From<ConfigError> for ApiError {
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.to_string())
    }
}
