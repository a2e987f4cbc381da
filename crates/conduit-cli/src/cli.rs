//! CLI argument definitions for conduit.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `route` | Resolve resources to their backend |
//! | `get` | Read a resource through the full resilience stack |
//! | `request` | Issue any verb through the full resilience stack |
//! | `status` | Show credential, breaker and cache state |
//! | `check-config` | Validate configuration and print the effective policy |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | `conduit.toml` | Configuration file (TOML or JSON) |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--timeout-ms` | from config | Per-attempt request timeout |
//! | `-v` | warn | Raise log verbosity (repeatable) |
//!
//! # Examples
//!
//! ```bash
//! conduit route portfolio users
//! conduit get /portfolio --param page=2 --pretty
//! conduit request post /contacts --data '{"email":"a@example.com"}'
//! conduit check-config --config site.json
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use conduit_core::{CacheMode, HttpMethod};

/// Conduit - resilient remote data source for content resources
///
/// Routes resources to the local database or a remote REST API and calls the
/// API with credential refresh, retry, circuit breaking and response caching.
#[derive(Debug, Parser)]
#[command(name = "conduit", author, version, about = "Resilient remote data source CLI")]
pub struct Cli {
    /// Configuration file with a `dataSource` table (.toml or .json).
    #[arg(long, global = true, default_value = "conduit.toml")]
    pub config: PathBuf,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Per-attempt request timeout in milliseconds. Overrides the config file.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Plain key/value lines for terminals.
    Table,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve resources to `database` or `api`.
    ///
    /// Without arguments every routable resource is listed.
    ///
    ///   conduit route
    ///   conduit route portfolio users
    Route(RouteArgs),

    /// Read a resource path through cache, retry and breaker.
    ///
    ///   conduit get /portfolio
    ///   conduit get /blog --param lang=en --cache-mode refresh
    Get(GetArgs),

    /// Issue an arbitrary verb against a resource path.
    ///
    ///   conduit request put /team/3 --data '{"name":"Ada"}'
    ///   conduit request delete /comments/12
    Request(RequestArgs),

    /// Show credential strategy, token validity, breakers and cache.
    Status,

    /// Validate the configuration and print the effective policy.
    CheckConfig,
}

/// Arguments for the `route` command.
#[derive(Debug, Args)]
pub struct RouteArgs {
    /// Resource names to resolve.
    pub resources: Vec<String>,
}

/// Query and cache options shared by `get` and `request`.
#[derive(Debug, Args)]
pub struct CallOptions {
    /// Query parameter as `name=value`. Repeatable.
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// How this call uses the response cache.
    #[arg(long, value_enum, default_value_t = CacheModeArg::Use)]
    pub cache_mode: CacheModeArg,

    /// Serve an expired cached copy if the remote is unavailable.
    #[arg(long, default_value_t = false)]
    pub stale_fallback: bool,
}

/// Arguments for the `get` command.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Resource path, e.g. `/portfolio/7`.
    pub path: String,

    #[command(flatten)]
    pub options: CallOptions,
}

/// Arguments for the `request` command.
#[derive(Debug, Args)]
pub struct RequestArgs {
    /// HTTP verb.
    #[arg(value_enum)]
    pub method: MethodArg,

    /// Resource path, e.g. `/portfolio`.
    pub path: String,

    /// JSON request body.
    #[arg(long)]
    pub data: Option<String>,

    #[command(flatten)]
    pub options: CallOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<MethodArg> for HttpMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => HttpMethod::Get,
            MethodArg::Post => HttpMethod::Post,
            MethodArg::Put => HttpMethod::Put,
            MethodArg::Patch => HttpMethod::Patch,
            MethodArg::Delete => HttpMethod::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheModeArg {
    /// Read the cache, store misses.
    Use,
    /// Skip the cached copy but store the fresh response.
    Refresh,
    /// Neither read nor write the cache.
    Bypass,
}

impl From<CacheModeArg> for CacheMode {
    fn from(mode: CacheModeArg) -> Self {
        match mode {
            CacheModeArg::Use => CacheMode::Use,
            CacheModeArg::Refresh => CacheMode::Refresh,
            CacheModeArg::Bypass => CacheMode::Bypass,
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    if name.trim().is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((name.trim().to_owned(), value.to_owned()))
}
