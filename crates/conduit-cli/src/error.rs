use conduit_core::{ApiError, ConfigError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Command(_) => 2,
            Self::Config(_) => 3,
            Self::Api(error) => match error {
                ApiError::Configuration(_) => 3,
                ApiError::Auth(_) => 4,
                ApiError::CircuitOpen { .. } => 5,
                ApiError::Network { .. } => 6,
                ApiError::Http { .. } => 7,
                ApiError::Decode(_) => 8,
            },
            Self::Serialization(_) => 9,
            Self::Io(_) => 10,
        }
    }

    /// Stable code printed next to the message.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Command(_) => "cli.command",
            Self::Config(_) => "config",
            Self::Api(error) => error.code(),
            Self::Serialization(_) => "cli.serialization",
            Self::Io(_) => "cli.io",
        }
    }
}
