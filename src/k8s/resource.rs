//! Resources bound to a manifest, and lightweight references by name
//!
//! [`Resource::apply`] decides between create, patch, and conflict from a
//! lookup made right before the mutation.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::DeleteOptions;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::catalog::{ApiResourceCatalog, ResourceDescriptor};
use super::client::{KubernetesApi, Lookup};
use super::error::{DeployError, KubeError};
use crate::config::options::{DeployOptions, VersionMode};
use crate::document::{Document, Node};
use crate::utils::logger::Console;
use crate::utils::wait::Poller;

/// Places a `version` label can live; kube-deploy owns these keys
const VERSION_KEYS: [&str; 3] = [
    "metadata.labels.version",
    "spec.template.metadata.labels.version",
    "spec.selector.version",
];

/// Whether `doc`'s identity includes its `version` label.
///
/// Services never do: their version comes from the selector linking, not
/// from the object itself.
pub fn supports_versions(doc: &Document, mode: &VersionMode) -> bool {
    if doc.kind() == Some("Service") {
        return false;
    }
    match mode {
        VersionMode::Set(_) => true,
        VersionMode::Disabled => false,
        VersionMode::FromManifest => doc.label("version").is_some_and(|v| !v.is_empty()),
    }
}

/// What [`Resource::apply`] did
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Created(Document),
    Updated(Document),
    NotModified(Document),
    /// Dry run: the plan was printed, nothing was sent
    DryRun,
}

/// Cascade policy for deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Background,
    Foreground,
    Orphan,
}

impl Propagation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Background => "Background",
            Propagation::Foreground => "Foreground",
            Propagation::Orphan => "Orphan",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeleteParams {
    pub propagation: Option<Propagation>,
    pub grace_period: Option<i64>,
    pub ignore_not_found: bool,
}

impl DeleteParams {
    pub fn background() -> Self {
        Self {
            propagation: Some(Propagation::Background),
            ..Self::default()
        }
    }

    pub fn ignore_not_found(mut self) -> Self {
        self.ignore_not_found = true;
        self
    }

    /// Request body for deleting an object of `kind`; Services take none
    fn body_for(&self, kind: &str) -> Option<DeleteOptions> {
        if kind == "Service" {
            return None;
        }
        Some(DeleteOptions {
            propagation_policy: self.propagation.map(|p| p.as_str().to_string()),
            grace_period_seconds: self.grace_period,
            ..DeleteOptions::default()
        })
    }
}

/// A manifest paired with the REST descriptor of its kind
#[derive(Debug, Clone)]
pub struct Resource {
    doc: Document,
    descriptor: Arc<ResourceDescriptor>,
}

impl Resource {
    pub fn new(doc: Document, catalog: &ApiResourceCatalog) -> Result<Self, KubeError> {
        let descriptor = catalog.resolve(doc.kind().unwrap_or_default())?;
        Ok(Self { doc, descriptor })
    }

    pub fn kind(&self) -> &str {
        self.doc.kind().unwrap_or(&self.descriptor.kind)
    }

    pub fn name(&self) -> &str {
        self.doc.name().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.doc.namespace()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn read_if_exists(&self, api: &KubernetesApi) -> Result<Lookup, KubeError> {
        api.get_if_exists(self.kind(), self.name(), self.namespace())
    }

    /// Create, patch, or refuse, depending on what the server holds now.
    pub fn apply(
        &mut self,
        api: &KubernetesApi,
        console: &Console,
        options: &DeployOptions,
    ) -> Result<Applied, DeployError> {
        tracing::trace!(manifest = %self.doc, "applying");
        let kind = self.kind().to_string();
        let name = self.name().to_string();

        let server = match self.read_if_exists(api)? {
            Lookup::Absent => {
                if api.is_dry_run() {
                    console.line(format!("# {} {} would be created", kind, name));
                    return Ok(Applied::DryRun);
                }
                let created = api.create(&self.doc)?;
                self.adopt_identity(created.get("metadata"));
                console.line(format!("# {} {} created", kind, name));
                return Ok(Applied::Created(created));
            }
            Lookup::Found(server) => server,
        };

        if supports_versions(&server, &options.version) && !options.overwrite {
            if api.is_dry_run() {
                console.line(format!(
                    "# {} {} would conflict with the existing resource",
                    kind, name
                ));
                return Ok(Applied::DryRun);
            }
            return Err(DeployError::AlreadyExists(name));
        }

        self.adopt_identity(server.get("metadata"));
        if api.is_dry_run() {
            console.line(format!("# {} {} would be patched", kind, name));
            return Ok(Applied::DryRun);
        }

        let patched = api.patch(&self.patch_body(&server))?;
        if patched.str("metadata.resourceVersion") == server.str("metadata.resourceVersion") {
            console.line(format!("# {} {} not modified", kind, name));
            Ok(Applied::NotModified(patched))
        } else {
            console.line(format!("# {} {} updated", kind, name));
            Ok(Applied::Updated(patched))
        }
    }

    /// Delete this object. Returns `false` when it was already gone and
    /// `ignore_not_found` was set.
    pub fn delete(
        &self,
        api: &KubernetesApi,
        console: &Console,
        params: &DeleteParams,
    ) -> Result<bool, KubeError> {
        let body = params.body_for(self.kind());
        match api.delete(self.kind(), self.name(), self.namespace(), body.as_ref()) {
            Ok(_) if api.is_dry_run() => {
                console.line(format!("# {} {} would be deleted", self.kind(), self.name()));
                Ok(true)
            }
            Ok(_) => {
                console.line(format!("# {} {} deleted", self.kind(), self.name()));
                Ok(true)
            }
            Err(err) if err.is_not_found() && params.ignore_not_found => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// The manifest as a merge patch against `server`.
    ///
    /// A `version` key the server holds but the manifest dropped is sent as
    /// `null`, since a merge patch keeps any key it does not mention.
    fn patch_body(&self, server: &Document) -> Document {
        let mut body = self.doc.clone();
        for path in VERSION_KEYS {
            if !server.get(path).is_absent() && self.doc.get(path).is_absent() {
                body.set(path, Value::Null);
            }
        }
        body
    }

    fn adopt_identity(&mut self, server_metadata: Node<'_>) {
        for field in ["uid", "resourceVersion"] {
            if let Some(value) = server_metadata.key(field).as_str() {
                self.doc.set(&format!("metadata.{}", field), value);
            }
        }
    }
}

/// Handle on an object known only by kind, name, and namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl Reference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn read(&self, api: &KubernetesApi) -> Result<Document, KubeError> {
        api.get(&self.kind, &self.name, Some(&self.namespace))
    }

    /// Delete the object, then optionally block until the server has
    /// removed it.
    pub fn delete(
        &self,
        api: &KubernetesApi,
        console: &Console,
        poller: &Poller,
        params: &DeleteParams,
        wait: Option<Duration>,
    ) -> Result<(), DeployError> {
        let body = params.body_for(&self.kind);
        match api.delete(&self.kind, &self.name, Some(&self.namespace), body.as_ref()) {
            Ok(_) => {}
            Err(err) if err.is_not_found() && params.ignore_not_found => {
                tracing::debug!(kind = %self.kind, name = %self.name, "already gone");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        if api.is_dry_run() {
            console.line(format!(
                "# {} {}/{} would be deleted",
                self.kind, self.namespace, self.name
            ));
            return Ok(());
        }
        console.section(format!(
            "Deleted {} {}/{}",
            self.kind, self.namespace, self.name
        ));
        match wait {
            Some(timeout) => self.wait_until_deleted(api, console, poller, timeout),
            None => Ok(()),
        }
    }

    /// Poll until a GET answers 404
    pub fn wait_until_deleted(
        &self,
        api: &KubernetesApi,
        console: &Console,
        poller: &Poller,
        timeout: Duration,
    ) -> Result<(), DeployError> {
        let mut announced = false;
        poller.poll(
            timeout,
            || match api.get_if_exists(&self.kind, &self.name, Some(&self.namespace))? {
                Lookup::Absent => Ok(Some(())),
                Lookup::Found(_) => {
                    if !announced {
                        console.section(format!(
                            "Waiting until server deletes {} {}/{}",
                            self.kind, self.namespace, self.name
                        ));
                        announced = true;
                    } else {
                        tracing::debug!(kind = %self.kind, name = %self.name, "still terminating");
                    }
                    Ok(None)
                }
            },
            || DeployError::WaitTimeout {
                target: format!("{} {}/{}", self.kind, self.namespace, self.name),
            },
        )
    }
}
