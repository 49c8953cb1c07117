//! Command implementations for the kube-deploy CLI

pub mod api_resources;
pub mod deploy;
pub mod logs;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::settings::Settings;
use crate::k8s::catalog::ApiResourceCatalog;
use crate::k8s::client::KubernetesApi;
use crate::k8s::connection::{ClusterConfig, resolve_namespace};

/// Per-request HTTP timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connected client plus the configuration it came from
pub struct Session {
    pub config: ClusterConfig,
    pub api: Arc<KubernetesApi>,
}

impl Session {
    /// Discover the cluster, load the kind catalog, and connect
    pub fn open(kubeconfig: Option<&Path>, settings: &Settings, dry_run: bool) -> Result<Self> {
        let catalog = Arc::new(load_catalog(settings)?);
        let config = ClusterConfig::discover(kubeconfig, &settings.cluster)
            .context("Failed to load Kubernetes configuration")?;
        tracing::debug!(server = %config.server, "connecting");

        let api = KubernetesApi::connect(&config, catalog, REQUEST_TIMEOUT)
            .context("Failed to create Kubernetes client")?
            .with_dry_run(dry_run);

        if settings.catalog.refresh_on_start {
            match api.catalog().refresh(&api) {
                Ok(count) => tracing::debug!(kinds = count, "refreshed resource catalog"),
                Err(err) => crate::log_warn!("Resource discovery failed, using built-in kinds: {}", err),
            }
        }

        Ok(Self {
            config,
            api: Arc::new(api),
        })
    }

    pub fn namespace(&self, explicit: Option<&str>, settings: &Settings) -> Result<String> {
        Ok(resolve_namespace(explicit, &settings.cluster, &self.config)?)
    }
}

/// Built-in kind table, or the one named in the settings
fn load_catalog(settings: &Settings) -> Result<ApiResourceCatalog> {
    let Some(path) = &settings.catalog.resources_file else {
        return Ok(ApiResourceCatalog::standard());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read api resources file: {}", path))?;
    ApiResourceCatalog::from_table(&text)
        .with_context(|| format!("Invalid api resources file: {}", path))
}
