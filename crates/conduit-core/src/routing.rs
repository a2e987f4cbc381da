use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DataSourceConfig, Provider};
use crate::error::{ApiError, ConfigError};

/// Content resources served by the host when `knownResources` is not set.
pub const DEFAULT_KNOWN_RESOURCES: &[&str] = &[
    "users",
    "portfolio",
    "blog",
    "team",
    "testimonials",
    "pricing",
    "contacts",
    "settings",
    "translations",
    "comments",
    "media",
];

/// Where a resource's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Database,
    Api,
}

impl Backend {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Api => "api",
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider mode resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSourceMode {
    /// Everything on the database unless overridden.
    Database,
    /// Everything on the remote API unless overridden.
    Api,
    /// Only the explicit entries are routable.
    Hybrid(BTreeMap<String, Backend>),
}

impl DataSourceMode {
    pub fn from_config(config: &DataSourceConfig) -> Self {
        match config.provider {
            Provider::Database => Self::Database,
            Provider::Api => Self::Api,
            Provider::Hybrid => Self::Hybrid(config.resources.clone()),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Api => "api",
            Self::Hybrid(_) => "hybrid",
        }
    }
}

/// Read-only resource to backend lookup built once at startup.
#[derive(Debug, Clone)]
pub struct ResourceRouter {
    mode: DataSourceMode,
    routes: BTreeMap<String, Backend>,
}

impl ResourceRouter {
    /// Build the routing table.
    ///
    /// In `database` and `api` mode every known resource routes to the
    /// provider backend and `resources` entries override individual names.
    /// In `hybrid` mode the table is exactly the `resources` entries.
    pub fn from_config(config: &DataSourceConfig) -> Result<Self, ConfigError> {
        let mode = DataSourceMode::from_config(config);

        let routes = match &mode {
            DataSourceMode::Hybrid(entries) => {
                if entries.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        name: String::from("dataSource.resources"),
                        reason: String::from("hybrid provider requires explicit per-resource entries"),
                    });
                }
                entries.clone()
            }
            DataSourceMode::Database | DataSourceMode::Api => {
                let default_backend = if mode == DataSourceMode::Api {
                    Backend::Api
                } else {
                    Backend::Database
                };

                let mut routes = match &config.known_resources {
                    Some(known) => known
                        .iter()
                        .map(|name| (name.clone(), default_backend))
                        .collect::<BTreeMap<_, _>>(),
                    None => DEFAULT_KNOWN_RESOURCES
                        .iter()
                        .map(|name| ((*name).to_owned(), default_backend))
                        .collect(),
                };

                for (name, backend) in &config.resources {
                    if routes.insert(name.clone(), *backend) != Some(*backend) {
                        debug!(resource = %name, backend = %backend, "routing override");
                    }
                }
                routes
            }
        };

        info!(
            mode = mode.name(),
            resources = routes.len(),
            api_resources = routes.values().filter(|b| **b == Backend::Api).count(),
            "resource router ready"
        );

        Ok(Self { mode, routes })
    }

    /// Backend serving `resource`.
    ///
    /// Unmapped names fail with [`ApiError::Configuration`]; there is no
    /// fallback backend.
    pub fn resolve_backend(&self, resource: &str) -> Result<Backend, ApiError> {
        self.routes.get(resource).copied().ok_or_else(|| {
            ApiError::configuration(format!(
                "resource '{resource}' has no routing entry in {} mode",
                self.mode.name()
            ))
        })
    }

    pub const fn mode(&self) -> &DataSourceMode {
        &self.mode
    }

    pub fn routes(&self) -> &BTreeMap<String, Backend> {
        &self.routes
    }

    /// Resource names served by `backend`, sorted.
    pub fn resources_on(&self, backend: Backend) -> Vec<&str> {
        self.routes
            .iter()
            .filter(|(_, served_by)| **served_by == backend)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// True when at least one resource is served by the remote API.
    pub fn uses_api(&self) -> bool {
        self.routes.values().any(|backend| *backend == Backend::Api)
    }
}
