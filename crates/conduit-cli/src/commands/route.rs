use std::collections::BTreeMap;

use conduit_core::{Backend, ConduitConfig, ResourceRouter};
use serde_json::json;

use crate::cli::RouteArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &RouteArgs, config: &ConduitConfig) -> Result<CommandResult, CliError> {
    let router = ResourceRouter::from_config(&config.data_source)?;

    let routes = if args.resources.is_empty() {
        router.routes().clone()
    } else {
        args.resources
            .iter()
            .map(|name| Ok((name.clone(), router.resolve_backend(name)?)))
            .collect::<Result<BTreeMap<String, Backend>, CliError>>()?
    };

    Ok(CommandResult::ok(json!({
        "mode": router.mode().name(),
        "routes": routes,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hybrid() -> ConduitConfig {
        ConduitConfig::from_toml_str(
            "[dataSource]\nprovider = \"hybrid\"\n[dataSource.resources]\nusers = \"database\"\nportfolio = \"api\"\n",
        )
        .expect("valid config")
    }

    #[test]
    fn lists_every_route_without_arguments() {
        let result = run(&RouteArgs { resources: Vec::new() }, &hybrid()).expect("routes");
        assert_eq!(result.data["mode"], "hybrid");
        assert_eq!(result.data["routes"]["portfolio"], "api");
        assert_eq!(result.data["routes"]["users"], "database");
    }

    #[test]
    fn unknown_resource_fails_with_configuration_exit_code() {
        let error = run(
            &RouteArgs {
                resources: vec![String::from("portfolio"), String::from("unknown_resource")],
            },
            &hybrid(),
        )
        .err()
        .expect("unmapped resource");
        assert_eq!(error.exit_code(), 3);
    }
}
