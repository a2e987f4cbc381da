use std::sync::Arc;

use conduit_core::{
    resource_group, ApiClient, ApiRequest, DataSourceRuntime, Fallback, HttpMethod,
    RequestOptions, ResponseOrigin,
};
use serde_json::Value;

use crate::cli::{CallOptions, GetArgs, RequestArgs};
use crate::error::CliError;

use super::CommandResult;

pub async fn get(args: &GetArgs, runtime: &DataSourceRuntime) -> Result<CommandResult, CliError> {
    let request = ApiRequest::get(args.path.as_str()).with_params(&args.options.params);
    call(runtime, request, &args.options).await
}

pub async fn send(
    args: &RequestArgs,
    runtime: &DataSourceRuntime,
) -> Result<CommandResult, CliError> {
    let mut request =
        ApiRequest::new(HttpMethod::from(args.method), args.path.as_str()).with_params(&args.options.params);

    if let Some(raw) = &args.data {
        let body: Value = serde_json::from_str(raw)
            .map_err(|error| CliError::Command(format!("--data is not valid JSON: {error}")))?;
        request = request.with_body(body);
    }

    call(runtime, request, &args.options).await
}

async fn call(
    runtime: &DataSourceRuntime,
    request: ApiRequest,
    options: &CallOptions,
) -> Result<CommandResult, CliError> {
    let client = client_for_path(runtime, &request.path)?;

    let fallback = if options.stale_fallback {
        Fallback::StaleCache
    } else {
        Fallback::None
    };
    let request_options = RequestOptions::default()
        .with_cache_mode(options.cache_mode.into())
        .with_fallback(fallback);

    let response = client.request_with(request, request_options).await?;

    let mut result =
        CommandResult::ok(response.data).with_response(response.status, response.origin);
    if response.origin == ResponseOrigin::StaleCache {
        result = result.with_warning("remote unavailable, served an expired cached response");
    }
    Ok(result)
}

fn client_for_path<'a>(
    runtime: &'a DataSourceRuntime,
    path: &str,
) -> Result<&'a Arc<ApiClient>, CliError> {
    let group = resource_group(path)?;
    runtime.client_for(&group)?.ok_or_else(|| {
        CliError::Command(format!(
            "resource '{group}' is served by the database, not the remote API"
        ))
    })
}
