mod check_config;
mod request;
mod route;
mod status;

use std::time::Instant;

use conduit_core::{ConduitConfig, DataSourceRuntime, ResponseOrigin};
use serde_json::Value;
use tracing::debug;

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::{Envelope, Metadata};

pub struct CommandResult {
    pub data: Value,
    pub origin: Option<ResponseOrigin>,
    pub status: Option<u16>,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            origin: None,
            status: None,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_response(mut self, status: u16, origin: ResponseOrigin) -> Self {
        self.status = Some(status);
        self.origin = Some(origin);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let started = Instant::now();
    let config = load_config(cli)?;

    let (name, command_result) = match &cli.command {
        Command::Route(args) => ("route", route::run(args, &config)?),
        Command::CheckConfig => ("check-config", check_config::run(&config)?),
        Command::Get(args) => {
            let runtime = DataSourceRuntime::from_env(config.data_source)?;
            ("get", request::get(args, &runtime).await?)
        }
        Command::Request(args) => {
            let runtime = DataSourceRuntime::from_env(config.data_source)?;
            ("request", request::send(args, &runtime).await?)
        }
        Command::Status => {
            let runtime = DataSourceRuntime::from_env(config.data_source)?;
            ("status", status::run(&runtime).await?)
        }
    };

    let CommandResult {
        data,
        origin,
        status,
        warnings,
    } = command_result;

    let mut meta = Metadata::new(name, elapsed_ms(started));
    meta.origin = origin;
    meta.status = status;
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope { meta, data })
}

fn load_config(cli: &Cli) -> Result<ConduitConfig, CliError> {
    let mut config = ConduitConfig::load_from_file(&cli.config)?;
    if let Some(timeout_ms) = cli.timeout_ms {
        debug!(timeout_ms, "timeout overridden on the command line");
        config.data_source.api.timeout = timeout_ms;
        config.data_source.validate()?;
    }
    Ok(config)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
