//! Generic CRUD client for the Kubernetes REST API
//!
//! Every call resolves its kind through the [`ApiResourceCatalog`] and goes
//! out through a [`Transport`]. In dry-run mode mutating verbs never reach
//! the transport and return an empty [`Document`].

use k8s_openapi::apimachinery::pkg::apis::meta::v1::DeleteOptions;
use std::sync::Arc;
use std::time::Duration;

use super::catalog::{ApiResourceCatalog, ResourceDescriptor, api_prefix};
use super::connection::ClusterConfig;
use super::error::KubeError;
use super::selector::Selector;
use super::transport::{ApiRequest, HttpTransport, JSON, MERGE_PATCH, Transport, Verb};
use crate::document::Document;
use crate::utils::dryrun::exec_unless_dry_run_with_default;

/// Result of a lookup that treats 404 as a normal outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Document),
    Absent,
}

/// Address of one object or collection
#[derive(Debug, Clone, Copy, Default)]
pub struct Target<'a> {
    pub name: Option<&'a str>,
    pub namespace: Option<&'a str>,
    pub subresource: Option<&'a str>,
}

pub struct KubernetesApi {
    transport: Arc<dyn Transport>,
    catalog: Arc<ApiResourceCatalog>,
    dry_run: bool,
}

impl std::fmt::Debug for KubernetesApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesApi")
            .field("catalog", &self.catalog)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl KubernetesApi {
    pub fn new(transport: Arc<dyn Transport>, catalog: Arc<ApiResourceCatalog>) -> Self {
        Self {
            transport,
            catalog,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Client over HTTPS for the given cluster
    pub fn connect(
        config: &ClusterConfig,
        catalog: Arc<ApiResourceCatalog>,
        timeout: Duration,
    ) -> Result<Self, KubeError> {
        let transport = HttpTransport::new(config, timeout)?;
        Ok(Self::new(Arc::new(transport), catalog))
    }

    pub fn catalog(&self) -> &Arc<ApiResourceCatalog> {
        &self.catalog
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Issue `verb` against `kind`, optionally scoped to a name and namespace.
    pub fn call(
        &self,
        verb: Verb,
        kind: &str,
        name: Option<&str>,
        namespace: Option<&str>,
        body: Option<&Document>,
    ) -> Result<Document, KubeError> {
        let descriptor = self.catalog.resolve(kind)?;
        let target = Target {
            name,
            namespace,
            subresource: None,
        };
        let mut request = ApiRequest::new(verb, resource_path(&descriptor, body, target));
        if let Some(body) = body {
            let content_type = if verb == Verb::Patch { MERGE_PATCH } else { JSON };
            request = request.body(body.to_primitive(), content_type);
        }
        self.execute(request)
    }

    pub fn get(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<Document, KubeError> {
        self.call(Verb::Get, kind, Some(name), namespace, None)
    }

    /// Read an object, mapping 404 to [`Lookup::Absent`]
    pub fn get_if_exists(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Lookup, KubeError> {
        match self.get(kind, name, namespace) {
            Ok(doc) => Ok(Lookup::Found(doc)),
            Err(err) if err.is_not_found() => Ok(Lookup::Absent),
            Err(err) => Err(err),
        }
    }

    /// List objects of `kind` matching `selector`.
    ///
    /// Items come back without `kind`/`apiVersion`; both are filled in from
    /// the descriptor.
    pub fn list(
        &self,
        kind: &str,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<Document>, KubeError> {
        let descriptor = self.catalog.resolve(kind)?;
        let target = Target {
            namespace,
            ..Target::default()
        };
        let mut request = ApiRequest::new(Verb::Get, resource_path(&descriptor, None, target));
        if !selector.is_empty() {
            request = request.query("labelSelector", selector);
        }
        let list = self.execute(request)?;

        Ok(list
            .get("items")
            .items()
            .map(|item| {
                let mut doc = item.to_document();
                if doc.kind().is_none_or(str::is_empty) {
                    doc.set("kind", descriptor.kind.as_str());
                }
                if !doc.contains("apiVersion") {
                    doc.set("apiVersion", descriptor.group_version.as_str());
                }
                doc
            })
            .collect())
    }

    /// Read the `/status` subresource
    pub fn get_status(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Document, KubeError> {
        let descriptor = self.catalog.resolve(kind)?;
        let target = Target {
            name: Some(name),
            namespace,
            subresource: Some("status"),
        };
        self.execute(ApiRequest::new(
            Verb::Get,
            resource_path(&descriptor, None, target),
        ))
    }

    pub fn create(&self, body: &Document) -> Result<Document, KubeError> {
        self.call(Verb::Post, kind_of(body)?, None, body.namespace(), Some(body))
    }

    /// Submit `body` as a JSON merge patch of the named object
    pub fn patch(&self, body: &Document) -> Result<Document, KubeError> {
        self.call(Verb::Patch, kind_of(body)?, body.name(), body.namespace(), Some(body))
    }

    /// Replace the named object with `body`
    pub fn replace(&self, body: &Document) -> Result<Document, KubeError> {
        self.call(Verb::Put, kind_of(body)?, body.name(), body.namespace(), Some(body))
    }

    pub fn delete(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        options: Option<&DeleteOptions>,
    ) -> Result<Document, KubeError> {
        let body = options
            .map(|options| {
                serde_json::to_value(options)
                    .and_then(Document::try_from)
                    .map_err(|source| KubeError::Decode {
                        path: format!("{}/{}", kind, name),
                        source,
                    })
            })
            .transpose()?;
        self.call(Verb::Delete, kind, Some(name), namespace, body.as_ref())
    }

    /// Raw text of a pod's log
    pub fn read_pod_log(
        &self,
        name: &str,
        namespace: &str,
        container: Option<&str>,
        tail_lines: Option<u32>,
    ) -> Result<String, KubeError> {
        let descriptor = self.catalog.resolve("Pod")?;
        let target = Target {
            name: Some(name),
            namespace: Some(namespace),
            subresource: Some("log"),
        };
        let mut request = ApiRequest::new(Verb::Get, resource_path(&descriptor, None, target));
        if let Some(container) = container {
            request = request.query("container", container);
        }
        if let Some(tail) = tail_lines {
            request = request.query("tailLines", tail);
        }
        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(KubeError::from_response(
                request.verb.as_str(),
                &request.path,
                response.status,
                &response.body,
            ));
        }
        Ok(response.body)
    }

    /// GET an arbitrary API path such as a discovery endpoint
    pub fn get_path(&self, path: &str) -> Result<Document, KubeError> {
        self.execute(ApiRequest::new(Verb::Get, path))
    }

    fn execute(&self, request: ApiRequest) -> Result<Document, KubeError> {
        let action = format!("{} {}", request.verb, request.path);
        if request.verb.is_mutating() {
            return exec_unless_dry_run_with_default(self.dry_run, &action, Document::new(), || {
                self.send(&request)
            });
        }
        self.send(&request)
    }

    fn send(&self, request: &ApiRequest) -> Result<Document, KubeError> {
        if let Some(body) = &request.body {
            tracing::trace!(verb = %request.verb, path = %request.path, body = %body, "request");
        } else {
            tracing::debug!(verb = %request.verb, path = %request.path, "request");
        }

        let response = self.transport.send(request)?;
        tracing::trace!(status = response.status, body = %response.body, "response");

        if !response.is_success() {
            return Err(KubeError::from_response(
                request.verb.as_str(),
                &request.path,
                response.status,
                &response.body,
            ));
        }
        if response.body.trim().is_empty() {
            return Ok(Document::new());
        }
        serde_json::from_str(&response.body).map_err(|source| KubeError::Decode {
            path: request.path.clone(),
            source,
        })
    }
}

fn kind_of(body: &Document) -> Result<&str, KubeError> {
    body.kind()
        .ok_or_else(|| KubeError::UnknownKind(String::new()))
}

/// REST path for a descriptor.
///
/// The body's `apiVersion`, when present, selects the group version;
/// otherwise the catalog's preferred one is used. The namespace segment is
/// only added for namespaced kinds.
pub fn resource_path(
    descriptor: &ResourceDescriptor,
    body: Option<&Document>,
    target: Target<'_>,
) -> String {
    let group_version = body
        .and_then(|body| body.str("apiVersion"))
        .filter(|gv| !gv.is_empty())
        .unwrap_or(&descriptor.group_version);

    let mut path = format!("/{}", api_prefix(group_version));
    if descriptor.namespaced
        && let Some(namespace) = target.namespace
    {
        path.push_str("/namespaces/");
        path.push_str(namespace);
    }
    path.push('/');
    path.push_str(&descriptor.plural);
    if let Some(name) = target.name {
        path.push('/');
        path.push_str(name);
    }
    if let Some(subresource) = target.subresource {
        path.push('/');
        path.push_str(subresource);
    }
    path
}
