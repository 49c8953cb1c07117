//! Deploy run options

use anyhow::{Result, bail};
use std::str::FromStr;
use std::time::Duration;

/// How the `version` label of each manifest is treated
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionMode {
    /// Keep whatever label the manifest carries
    #[default]
    FromManifest,
    /// Stamp this version on every manifest
    Set(String),
    /// Remove the label; nothing is version-aware
    Disabled,
}

/// A `KEY=VALUE` annotation given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub key: String,
    pub value: String,
}

impl FromStr for Annotation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok(Self {
                key: key.to_string(),
                value: value.to_string(),
            }),
            _ => Err(format!("invalid annotation '{}': expected KEY=VALUE", s)),
        }
    }
}

/// Options builder
#[derive(Debug, Clone, Default)]
pub struct DeployOptionsBuilder {
    app_name: Option<String>,
    namespace: Option<String>,
    version: VersionMode,
    overwrite: bool,
    replicas: Option<u32>,
    delete_old_versions: bool,
    annotations: Vec<Annotation>,
    wait: Option<Option<Duration>>,
    delete_timeout: Option<Duration>,
    dry_run: bool,
}

impl DeployOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn version(mut self, version: VersionMode) -> Self {
        self.version = version;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn replicas(mut self, replicas: u32) -> Self {
        self.replicas = Some(replicas);
        self
    }

    pub fn delete_old_versions(mut self, delete: bool) -> Self {
        self.delete_old_versions = delete;
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Wait timeout for workloads; `None` or zero disables waiting
    pub fn wait(mut self, wait: Option<Duration>) -> Self {
        self.wait = Some(wait.filter(|timeout| !timeout.is_zero()));
        self
    }

    pub fn delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = Some(timeout);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<DeployOptions> {
        let Some(app_name) = self.app_name.filter(|name| !name.is_empty()) else {
            bail!("application name is required");
        };
        let Some(namespace) = self.namespace.filter(|ns| !ns.is_empty()) else {
            bail!("namespace is required");
        };
        if let VersionMode::Set(version) = &self.version
            && version.is_empty()
        {
            bail!("--set-version needs a non-empty value");
        }

        Ok(DeployOptions {
            app_name,
            namespace,
            version: self.version,
            overwrite: self.overwrite,
            replicas: self.replicas.unwrap_or(1),
            delete_old_versions: self.delete_old_versions,
            annotations: self.annotations,
            wait: self.wait.unwrap_or(Some(Duration::from_secs(60))),
            delete_timeout: self.delete_timeout.unwrap_or(Duration::from_secs(120)),
            dry_run: self.dry_run,
        })
    }
}

/// Everything one deploy run needs, fixed before the first API call
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub app_name: String,
    pub namespace: String,
    pub version: VersionMode,
    pub overwrite: bool,
    pub replicas: u32,
    pub delete_old_versions: bool,
    pub annotations: Vec<Annotation>,
    pub wait: Option<Duration>,
    pub delete_timeout: Duration,
    pub dry_run: bool,
}

impl DeployOptions {
    pub fn builder() -> DeployOptionsBuilder {
        DeployOptionsBuilder::new()
    }
}
