use conduit_core::{Backend, DataSourceRuntime};
use serde_json::{json, Value};

use crate::error::CliError;

use super::CommandResult;

pub async fn run(runtime: &DataSourceRuntime) -> Result<CommandResult, CliError> {
    let router = runtime.router();

    let client = match runtime.client() {
        Ok(client) => {
            let token = client.token_status().await;
            json!({
                "base_url": client.base_url(),
                "credential": serde_json::to_value(token)?,
                "circuits": serde_json::to_value(client.circuit_state())?,
                "cache": serde_json::to_value(client.cache_stats())?,
            })
        }
        Err(_) => Value::Null,
    };

    Ok(CommandResult::ok(json!({
        "mode": router.mode().name(),
        "api_resources": router.resources_on(Backend::Api),
        "database_resources": router.resources_on(Backend::Database),
        "client": client,
    })))
}
