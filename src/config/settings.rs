//! Configuration file support for kube-deploy

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::wait::Poller;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub wait: WaitSettings,

    #[serde(default)]
    pub cluster: ClusterSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,
}

/// Timeouts and polling cadence
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WaitSettings {
    /// Default `--wait` timeout for Deployments and Pods
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long to wait for the server to remove a deleted object
    #[serde(default = "default_delete_timeout_secs")]
    pub delete_timeout_secs: u64,
}

/// In-cluster service account locations
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClusterSettings {
    /// API server host, used when KUBERNETES_SERVICE_HOST is unset
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_token_file")]
    pub token_file: String,

    #[serde(default = "default_ca_cert")]
    pub ca_cert: String,

    #[serde(default = "default_namespace_file")]
    pub namespace_file: String,
}

/// Resource kind table
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CatalogSettings {
    /// `kubectl api-resources -o wide` output to use instead of the built-in table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_file: Option<String>,

    /// Query the cluster's discovery endpoints before every command
    #[serde(default)]
    pub refresh_on_start: bool,
}

// Default value functions
fn default_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_delete_timeout_secs() -> u64 {
    120
}

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

fn default_host() -> String {
    "kubernetes.default.svc".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_token_file() -> String {
    format!("{}/token", SERVICE_ACCOUNT_DIR)
}

fn default_ca_cert() -> String {
    format!("{}/ca.crt", SERVICE_ACCOUNT_DIR)
}

fn default_namespace_file() -> String {
    format!("{}/namespace", SERVICE_ACCOUNT_DIR)
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            delete_timeout_secs: default_delete_timeout_secs(),
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            token_file: default_token_file(),
            ca_cert: default_ca_cert(),
            namespace_file: default_namespace_file(),
        }
    }
}

impl WaitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// Poller at the configured interval; never faster than 10ms
    pub fn poller(&self) -> Poller {
        Poller::new(Duration::from_millis(self.poll_interval_ms.max(10)))
    }
}

impl Settings {
    /// Load settings from file or return defaults
    pub fn load() -> Self {
        let Some(path) = Self::find_config_file() else {
            return Self::default();
        };
        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(err) => {
                crate::log_warn!("{:#}; using default settings", err);
                Self::default()
            }
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .kube-deploy.toml in current directory
    /// 2. ~/.config/kube-deploy/config.toml (XDG config directory)
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(".kube-deploy.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("kube-deploy").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Generate example config file content
    pub fn example_config() -> String {
        let header = "# kube-deploy configuration file\n\
                      # Place this file at ~/.config/kube-deploy/config.toml or .kube-deploy.toml in your project\n\n";

        match toml::to_string_pretty(&Settings::default()) {
            Ok(config) => format!("{}{}", header, config),
            Err(_) => format!(
                "{}[wait]\ntimeout_secs = 60\npoll_interval_ms = 1000\ndelete_timeout_secs = 120\n",
                header
            ),
        }
    }
}
