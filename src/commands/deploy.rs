//! Deploy command: apply a set of manifests as one versioned release
//!
//! Every object touched by one run carries the same `update-id` label. That
//! label is how the run finds the ReplicaSets and pods it spawned, without
//! walking owner references.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use super::Session;
use crate::config::options::{Annotation, DeployOptions, VersionMode};
use crate::config::settings::Settings;
use crate::document::Document;
use crate::k8s::controller::NamespaceController;
use crate::k8s::error::DeployError;
use crate::k8s::pod::ContainerWait;
use crate::k8s::resource::{Applied, DeleteParams, Reference, Resource, supports_versions};
use crate::k8s::selector::Selector;
use crate::utils::logger::Console;

/// Apply priority of a kind: lower goes first
pub fn apply_priority(kind: Option<&str>) -> u8 {
    match kind {
        Some("ConfigMap") => 1,
        Some("Deployment") => 20,
        Some("Service") => 30,
        _ => 10,
    }
}

/// Read every document of every manifest file, in order
pub fn read_manifests(paths: &[PathBuf]) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for path in paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let parsed = parse_manifests(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        tracing::debug!(file = %path.display(), documents = parsed.len(), "read manifest");
        docs.extend(parsed);
    }
    Ok(docs)
}

/// Split a multi-document YAML stream; empty documents are skipped
pub fn parse_manifests(content: &str) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for (index, doc) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_json::Value::deserialize(doc)
            .with_context(|| format!("invalid YAML in document {}", index + 1))?;
        if value.is_null() {
            continue;
        }
        let doc = Document::try_from(value)
            .with_context(|| format!("document {} is not a mapping", index + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}

/// Apply the run's version policy to the `version` label.
///
/// Deployments get the same treatment on their pod template so that a
/// version-linked Service selects the matching pods.
pub fn set_version(doc: &mut Document, mode: &VersionMode) {
    let mut label_maps = vec!["metadata.labels"];
    if doc.kind() == Some("Deployment") {
        label_maps.push("spec.template.metadata.labels");
    }
    for path in label_maps {
        match mode {
            VersionMode::FromManifest => {}
            VersionMode::Set(version) => {
                doc.map_mut(path)
                    .insert("version".to_string(), version.as_str().into());
            }
            VersionMode::Disabled => {
                if doc.get(path).is_object() {
                    doc.map_mut(path).remove("version");
                }
            }
        }
    }
}

/// Merge `annotations` into `metadata.annotations` (and the pod template's
/// for Deployments)
pub fn set_annotations(doc: &mut Document, annotations: &[Annotation]) {
    if annotations.is_empty() {
        return;
    }
    let mut targets = vec!["metadata.annotations"];
    if doc.kind() == Some("Deployment") {
        targets.push("spec.template.metadata.annotations");
    }
    for path in targets {
        let map = doc.map_mut(path);
        for annotation in annotations {
            map.insert(annotation.key.clone(), annotation.value.as_str().into());
        }
    }
}

fn set_label(doc: &mut Document, path: &str, key: &str, value: &str) {
    doc.map_mut(path).insert(key.to_string(), value.into());
}

/// Deployments of this run, by name
#[derive(Debug, Default)]
pub struct AppIndex {
    deployments: BTreeMap<String, Document>,
}

impl AppIndex {
    pub fn index(&mut self, doc: &Document) {
        if doc.kind() == Some("Deployment") {
            let name = doc.name().unwrap_or_default().to_string();
            self.deployments.insert(name, doc.clone());
        }
    }

    pub fn deployments(&self) -> impl Iterator<Item = &Document> {
        self.deployments.values()
    }

    /// Point the Service's selector at the generation of its sibling
    /// Deployment (same `app` label).
    ///
    /// A version-aware Deployment puts its version into the selector;
    /// otherwise any `version` selector is dropped so the Service matches
    /// every generation.
    pub fn link_service(&self, service: &mut Document, mode: &VersionMode, console: &Console) {
        let service_name = service.name().unwrap_or_default().to_string();
        let Some(app) = service.label("app").map(str::to_string) else {
            return;
        };

        for deployment in self.deployments() {
            if deployment.label("app") != Some(app.as_str()) {
                continue;
            }
            if supports_versions(deployment, mode) {
                let version = deployment.label("version").unwrap_or_default();
                service.set("spec.selector.version", version);
                console.line(format!(
                    "# Service {}: set labels.version = {}",
                    service_name, version
                ));
            } else {
                console.line(format!(
                    "# Service {}: no labels.version in resource definition",
                    service_name
                ));
                service.remove("spec.selector.version");
            }
        }
    }
}

/// Outcome of one deploy run
#[derive(Debug, Default)]
pub struct DeployReport {
    pub update_id: String,
    /// (kind, name) in the order they were applied
    pub applied: Vec<(String, String)>,
    pub pruned: usize,
}

/// Runs the deploy workflow against one namespace
pub struct Deployer {
    controller: NamespaceController,
    options: DeployOptions,
    update_id: String,
}

impl Deployer {
    pub fn new(controller: NamespaceController, options: DeployOptions) -> Self {
        Self {
            controller,
            options,
            update_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn run(&self, mut docs: Vec<Document>) -> Result<DeployReport, DeployError> {
        let console = self.controller.console();
        let mut index = AppIndex::default();
        for doc in &mut docs {
            set_version(doc, &self.options.version);
            set_annotations(doc, &self.options.annotations);
            index.index(doc);
        }

        // prune targets keep input order
        let versions: Vec<(String, String)> = docs
            .iter()
            .filter(|doc| supports_versions(doc, &self.options.version))
            .filter_map(|doc| {
                let version = doc.label("version").filter(|v| !v.is_empty())?;
                Some((doc.kind()?.to_string(), version.to_string()))
            })
            .collect();

        docs.sort_by_key(|doc| apply_priority(doc.kind()));

        let mut report = DeployReport {
            update_id: self.update_id.clone(),
            ..DeployReport::default()
        };
        tracing::info!(update_id = %self.update_id, documents = docs.len(), "starting deploy");

        for doc in docs {
            let (kind, name) = self.apply_one(doc, &index, console)?;
            report.applied.push((kind, name));
        }

        if self.options.delete_old_versions {
            report.pruned = self.delete_old_versions(&versions)?;
        }
        Ok(report)
    }

    fn apply_one(
        &self,
        mut doc: Document,
        index: &AppIndex,
        console: &Console,
    ) -> Result<(String, String), DeployError> {
        let namespace = self.controller.namespace();
        doc.set("metadata.namespace", namespace);
        set_label(&mut doc, "metadata.labels", "update-id", &self.update_id);

        let kind = doc.kind().map(str::to_string);
        match kind.as_deref() {
            Some("Deployment") => {
                set_label(
                    &mut doc,
                    "spec.template.metadata.labels",
                    "update-id",
                    &self.update_id,
                );
                doc.set("spec.replicas", self.options.replicas);
            }
            Some("Pod") if self.options.overwrite => {
                let pod = Reference::new("Pod", doc.name().unwrap_or_default(), namespace);
                pod.delete(
                    self.controller.api(),
                    console,
                    self.controller.poller(),
                    &DeleteParams::default().ignore_not_found(),
                    Some(self.options.delete_timeout),
                )?;
            }
            Some("Service") => index.link_service(&mut doc, &self.options.version, console),
            _ => {}
        }

        let mut resource = Resource::new(doc, self.controller.api().catalog())?;
        let applied = resource.apply(self.controller.api(), console, &self.options)?;
        let kind = resource.kind().to_string();
        let name = resource.name().to_string();

        if let Some(timeout) = self.options.wait
            && applied != Applied::DryRun
        {
            match kind.as_str() {
                "Deployment" => {
                    let app = resource
                        .document()
                        .label("app")
                        .unwrap_or(self.options.app_name.as_str());
                    let selector = Selector::new()
                        .eq("app", app)
                        .eq("update-id", self.update_id.as_str());
                    self.controller.wait_for_deployment(&selector, timeout, 1)?;
                }
                "Pod" => self.process_pod_results(resource.document(), timeout)?,
                _ => {}
            }
        }
        Ok((kind, name))
    }

    /// Wait for a one-shot pod, print its log, and delete it on success
    fn process_pod_results(&self, pod: &Document, timeout: std::time::Duration) -> Result<(), DeployError> {
        let api = self.controller.api();
        let console = self.controller.console();
        let poller = self.controller.poller();
        let container = pod.str("spec.containers.0.name").unwrap_or_default();
        let reference = Reference::new(
            "Pod",
            pod.name().unwrap_or_default(),
            self.controller.namespace(),
        );

        let terminated = reference.wait_for_container(
            api,
            console,
            poller,
            ContainerWait {
                container,
                state: "terminated",
                exit_code: Some(0),
                max_restarts: Some(1),
            },
            timeout,
        )?;
        // -1: the container never terminated before the restart cap
        let exit_code = terminated.get("exitCode").as_i64().unwrap_or(-1);
        tracing::debug!(pod = %reference.name, exit_code, "container finished");

        let log = reference.read_log(api, container)?;
        console.container_log(&log, &reference.name, container);

        if exit_code != 0 {
            return Err(DeployError::ContainerFailed {
                pod: reference.name.clone(),
                container: container.to_string(),
                exit_code,
            });
        }
        reference.delete(
            api,
            console,
            poller,
            &DeleteParams::default(),
            Some(self.options.delete_timeout),
        )
    }

    /// Delete objects of the app whose version differs from this run's.
    ///
    /// Each (kind, version) pair is handled once.
    fn delete_old_versions(&self, versions: &[(String, String)]) -> Result<usize, DeployError> {
        let mut done = HashSet::new();
        let mut deleted = 0;
        for (kind, version) in versions {
            if !done.insert((kind.as_str(), version.as_str())) {
                continue;
            }
            let selector = Selector::new()
                .eq("app", self.options.app_name.as_str())
                .ne("version", version.as_str());
            tracing::debug!(kind = %kind, selector = %selector, "delete old versions");
            deleted += self
                .controller
                .delete_resources(kind, &selector, &DeleteParams::background())?;
        }
        Ok(deleted)
    }
}

/// Command-line inputs of `kube-deploy deploy`
#[derive(Debug, Clone)]
pub struct DeployArgs {
    pub manifests: Vec<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub namespace: Option<String>,
    pub app_name: String,
    pub version: VersionMode,
    pub overwrite: bool,
    pub replicas: u32,
    pub delete_old_versions: bool,
    pub annotations: Vec<Annotation>,
    /// `None`: use the configured default; `Some(None)`: do not wait
    pub wait: Option<Option<u64>>,
    pub dry_run: bool,
    pub quiet: bool,
}

/// Handle the deploy command
pub fn deploy(args: DeployArgs, settings: &Settings) -> Result<()> {
    let console = Console::new(args.quiet);
    let session = Session::open(args.kubeconfig.as_deref(), settings, args.dry_run)?;
    let namespace = session.namespace(args.namespace.as_deref(), settings)?;

    if args.dry_run {
        console.line("# DRY RUN: no changes will be made");
    }

    let wait = match args.wait {
        Some(None) => None,
        Some(Some(secs)) => Some(std::time::Duration::from_secs(secs)),
        None => Some(settings.wait.timeout()),
    };

    let options = DeployOptions::builder()
        .app_name(&args.app_name)
        .namespace(&namespace)
        .version(args.version)
        .overwrite(args.overwrite)
        .replicas(args.replicas)
        .delete_old_versions(args.delete_old_versions)
        .annotations(args.annotations)
        .wait(wait)
        .delete_timeout(settings.wait.delete_timeout())
        .dry_run(args.dry_run)
        .build()?;

    let docs = read_manifests(&args.manifests)?;
    crate::log_info!(
        "Deploying {} document(s) of {} to namespace {}",
        docs.len(),
        options.app_name,
        namespace
    );

    let controller = NamespaceController::new(
        Arc::clone(&session.api),
        console,
        settings.wait.poller(),
        namespace,
    );
    let report = Deployer::new(controller, options)
        .run(docs)
        .context("Deploy failed")?;

    crate::log_info!(
        "Deploy {} applied {} resource(s), pruned {}",
        report.update_id,
        report.applied.len(),
        report.pruned
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::transport::Verb;
    use crate::testing::{FakeClock, FakeCluster};
    use crate::utils::wait::Poller;
    use serde_json::json;
    use std::time::Duration;

    const MANIFESTS: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: web
  labels:
    app: demo
spec:
  selector:
    app: demo
    version: stale
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  labels:
    app: demo
    version: v3
spec:
  template:
    metadata:
      labels:
        app: demo
        version: v3
    spec:
      containers:
        - name: web
          image: nginx
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: web-config
  labels:
    app: demo
data:
  key: value
"#;

    fn deployer(cluster: &FakeCluster, options: DeployOptions) -> Deployer {
        let api = cluster.api().with_dry_run(options.dry_run);
        let controller = NamespaceController::new(
            Arc::new(api),
            Console::capture(),
            Poller::with_clock(Duration::from_secs(1), Arc::new(FakeClock::new())),
            "ns",
        );
        let mut deployer = Deployer::new(controller, options);
        deployer.update_id = "run-1".to_string();
        deployer
    }

    fn options() -> crate::config::options::DeployOptionsBuilder {
        DeployOptions::builder().app_name("demo").namespace("ns")
    }

    fn console_of(deployer: &Deployer) -> Vec<String> {
        deployer.controller.console().captured()
    }

    #[test]
    fn test_parse_multi_document() {
        let docs = parse_manifests(MANIFESTS).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[1].str("spec.template.spec.containers.0.image"), Some("nginx"));

        assert!(parse_manifests("---\n---\n").unwrap().is_empty());
        assert!(parse_manifests("- a\n- b\n").is_err());
    }

    #[test]
    fn test_read_manifests_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.yaml");
        let second = dir.path().join("b.yaml");
        std::fs::write(&first, "kind: ConfigMap\nmetadata:\n  name: a\n").unwrap();
        std::fs::write(&second, MANIFESTS).unwrap();

        let docs = read_manifests(&[first, second]).unwrap();
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].name(), Some("a"));

        let missing = read_manifests(&[dir.path().join("missing.yaml")]);
        assert!(missing.is_err());
    }

    #[test]
    fn test_apply_order() {
        let mut kinds = vec!["Service", "Secret", "Deployment", "ConfigMap"];
        kinds.sort_by_key(|kind| apply_priority(Some(kind)));
        assert_eq!(kinds, vec!["ConfigMap", "Secret", "Deployment", "Service"]);
    }

    #[test]
    fn test_deployment_applied_before_service() {
        let cluster = FakeCluster::new();
        let deployer = deployer(&cluster, options().wait(None).build().unwrap());
        let report = deployer.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        let kinds: Vec<&str> = report.applied.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(kinds, vec!["ConfigMap", "Deployment", "Service"]);
        let posts: Vec<String> = cluster
            .mutations()
            .into_iter()
            .filter(|(verb, _)| *verb == Verb::Post)
            .map(|(_, path)| path)
            .collect();
        assert_eq!(
            posts,
            vec![
                "/api/v1/namespaces/ns/configmaps",
                "/apis/apps/v1/namespaces/ns/deployments",
                "/api/v1/namespaces/ns/services",
            ]
        );
    }

    #[test]
    fn test_labels_namespace_and_replicas() {
        let cluster = FakeCluster::new();
        let deployer = deployer(
            &cluster,
            options()
                .wait(None)
                .replicas(3)
                .annotation("team=web".parse().unwrap())
                .build()
                .unwrap(),
        );
        deployer.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        let deploy = cluster.object("Deployment", "ns", "web").unwrap();
        assert_eq!(deploy.namespace(), Some("ns"));
        assert_eq!(deploy.label("update-id"), Some("run-1"));
        assert_eq!(
            deploy.get("spec.template.metadata.labels").key("update-id"),
            "run-1"
        );
        assert_eq!(deploy.get("spec.replicas").as_i64(), Some(3));
        assert_eq!(deploy.get("metadata.annotations").key("team"), "web");
        assert_eq!(
            deploy.get("spec.template.metadata.annotations").key("team"),
            "web"
        );

        let config = cluster.object("ConfigMap", "ns", "web-config").unwrap();
        assert_eq!(config.label("update-id"), Some("run-1"));
        assert_eq!(config.get("metadata.annotations").key("team"), "web");
        assert!(config.get("spec.template").is_absent());
    }

    #[test]
    fn test_service_linked_to_versioned_deployment() {
        let cluster = FakeCluster::new();
        let deployer = deployer(&cluster, options().wait(None).build().unwrap());
        deployer.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        let service = cluster.object("Service", "ns", "web").unwrap();
        assert_eq!(service.str("spec.selector.version"), Some("v3"));
        assert!(console_of(&deployer).contains(&"# Service web: set labels.version = v3".to_string()));
    }

    #[test]
    fn test_service_unlinked_without_versions() {
        let cluster = FakeCluster::new();
        let deployer = deployer(
            &cluster,
            options().wait(None).version(VersionMode::Disabled).build().unwrap(),
        );
        deployer.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        let service = cluster.object("Service", "ns", "web").unwrap();
        assert!(service.get("spec.selector.version").is_absent());
        assert_eq!(service.str("spec.selector.app"), Some("demo"));
        let deploy = cluster.object("Deployment", "ns", "web").unwrap();
        assert_eq!(deploy.label("version"), None);
        assert!(console_of(&deployer)
            .contains(&"# Service web: no labels.version in resource definition".to_string()));
    }

    #[test]
    fn test_unversioned_redeploy_clears_pinned_selector() {
        let cluster = FakeCluster::new();
        deployer(&cluster, options().wait(None).build().unwrap())
            .run(parse_manifests(MANIFESTS).unwrap())
            .unwrap();
        let service = cluster.object("Service", "ns", "web").unwrap();
        assert_eq!(service.str("spec.selector.version"), Some("v3"));

        let redeploy = deployer(
            &cluster,
            options()
                .wait(None)
                .version(VersionMode::Disabled)
                .overwrite(true)
                .build()
                .unwrap(),
        );
        redeploy.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        let service = cluster.object("Service", "ns", "web").unwrap();
        assert!(service.get("spec.selector.version").is_absent());
        assert_eq!(service.str("spec.selector.app"), Some("demo"));
        let deploy = cluster.object("Deployment", "ns", "web").unwrap();
        assert!(deploy.get("metadata.labels.version").is_absent());
        assert!(deploy.get("spec.template.metadata.labels.version").is_absent());
        assert_eq!(deploy.label("app"), Some("demo"));
    }

    #[test]
    fn test_set_version_stamps_every_document() {
        let mut docs = parse_manifests(MANIFESTS).unwrap();
        for doc in &mut docs {
            set_version(doc, &VersionMode::Set("v9".to_string()));
        }
        assert!(docs.iter().all(|doc| doc.label("version") == Some("v9")));
        assert_eq!(
            docs[1].get("spec.template.metadata.labels").key("version"),
            "v9"
        );

        let mut untouched = parse_manifests(MANIFESTS).unwrap();
        set_version(&mut untouched[2], &VersionMode::FromManifest);
        assert_eq!(untouched[2].label("version"), None);
    }

    #[test]
    fn test_waits_for_this_runs_replica_set() {
        let cluster = FakeCluster::new();
        cluster.simulate_workloads(0);
        let deployer = deployer(&cluster, options().build().unwrap());
        deployer.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        assert!(console_of(&deployer).contains(
            &"#### Waiting for deployment(s) to start: app=demo,update-id=run-1".to_string()
        ));
        assert!(cluster.requests().iter().any(|(_, path)| {
            path == "/apis/apps/v1/namespaces/ns/replicasets?labelSelector=app=demo,update-id=run-1"
        }));
    }

    #[test]
    fn test_zero_wait_skips_waiting() {
        let cluster = FakeCluster::new();
        let deployer = deployer(&cluster, options().wait(Some(Duration::ZERO)).build().unwrap());
        deployer.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        assert!(!cluster
            .requests()
            .iter()
            .any(|(_, path)| path.contains("/replicasets")));
    }

    #[test]
    fn test_versioned_redeploy_requires_overwrite() {
        let cluster = FakeCluster::new();
        deployer(&cluster, options().wait(None).build().unwrap())
            .run(parse_manifests(MANIFESTS).unwrap())
            .unwrap();

        let v4 = MANIFESTS.replace("v3", "v4");
        let err = deployer(&cluster, options().wait(None).build().unwrap())
            .run(parse_manifests(&v4).unwrap())
            .unwrap_err();
        assert!(matches!(err, DeployError::AlreadyExists(name) if name == "web"));

        deployer(&cluster, options().wait(None).overwrite(true).build().unwrap())
            .run(parse_manifests(&v4).unwrap())
            .unwrap();
        let deploy = cluster.object("Deployment", "ns", "web").unwrap();
        assert_eq!(deploy.label("version"), Some("v4"));
    }

    #[test]
    fn test_delete_old_versions() {
        let cluster = FakeCluster::new();
        cluster.insert(
            Document::try_from(json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "web-v2", "namespace": "ns",
                             "labels": {"app": "demo", "version": "v2"}}
            }))
            .unwrap(),
        );
        let manifests = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web-v3
  labels: {app: demo, version: v3}
spec:
  template:
    metadata:
      labels: {app: demo, version: v3}
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings-v3
  labels: {app: demo, version: v3}
"#;
        let deployer = deployer(
            &cluster,
            options().wait(None).delete_old_versions(true).build().unwrap(),
        );
        let report = deployer.run(parse_manifests(manifests).unwrap()).unwrap();

        assert_eq!(report.pruned, 1);
        assert!(cluster.object("Deployment", "ns", "web-v2").is_none());
        assert!(cluster.object("Deployment", "ns", "web-v3").is_some());
        assert!(cluster.object("ConfigMap", "ns", "settings-v3").is_some());
        let lists = cluster
            .requests()
            .into_iter()
            .filter(|(_, path)| path.contains("labelSelector=app=demo,version!=v3"))
            .count();
        assert_eq!(lists, 2);
    }

    #[test]
    fn test_prune_pairs_deduplicated() {
        let cluster = FakeCluster::new();
        let manifests = r#"
kind: ConfigMap
apiVersion: v1
metadata: {name: a, labels: {app: demo, version: v3}}
---
kind: ConfigMap
apiVersion: v1
metadata: {name: b, labels: {app: demo, version: v3}}
"#;
        deployer(
            &cluster,
            options().wait(None).delete_old_versions(true).build().unwrap(),
        )
        .run(parse_manifests(manifests).unwrap())
        .unwrap();
        let lists = cluster
            .requests()
            .into_iter()
            .filter(|(_, path)| path.contains("version!=v3"))
            .count();
        assert_eq!(lists, 1);
    }

    const JOB_POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: migrate
  labels: {app: demo}
spec:
  containers:
    - name: main
      image: busybox
"#;

    #[test]
    fn test_pod_success_prints_log_and_deletes() {
        let cluster = FakeCluster::new();
        cluster.simulate_workloads(0);
        let deployer = deployer(&cluster, options().build().unwrap());
        deployer.run(parse_manifests(JOB_POD).unwrap()).unwrap();

        let console = console_of(&deployer);
        assert!(console.contains(&"#### Waiting for container migrate/main".to_string()));
        assert!(console.contains(&"# ---------- migrate/main".to_string()));
        assert!(console.contains(&"#     job output".to_string()));
        assert!(console.contains(&"#### Deleted Pod ns/migrate".to_string()));
        assert!(cluster.object("Pod", "ns", "migrate").is_none());
    }

    #[test]
    fn test_pod_failure_keeps_pod_and_reports() {
        let cluster = FakeCluster::new();
        cluster.simulate_workloads(3);
        let deployer = deployer(&cluster, options().build().unwrap());
        let err = deployer.run(parse_manifests(JOB_POD).unwrap()).unwrap_err();

        assert!(matches!(
            err,
            DeployError::ContainerFailed { exit_code: 3, ref container, .. } if container == "main"
        ));
        assert!(console_of(&deployer).contains(&"#     job output".to_string()));
        assert!(cluster.object("Pod", "ns", "migrate").is_some());
    }

    #[test]
    fn test_pod_overwrite_deletes_existing_first() {
        let cluster = FakeCluster::new();
        let mut existing = parse_manifests(JOB_POD).unwrap().remove(0);
        existing.set("metadata.namespace", "ns");
        cluster.insert(existing);
        let deployer = deployer(&cluster, options().wait(None).overwrite(true).build().unwrap());
        deployer.run(parse_manifests(JOB_POD).unwrap()).unwrap();

        let verbs: Vec<Verb> = cluster.mutations().into_iter().map(|(verb, _)| verb).collect();
        assert_eq!(verbs, vec![Verb::Delete, Verb::Post]);
        assert!(console_of(&deployer).contains(&"# Pod migrate created".to_string()));
    }

    #[test]
    fn test_pod_overwrite_of_missing_pod_reports_no_delete() {
        let cluster = FakeCluster::new();
        let deployer = deployer(&cluster, options().wait(None).overwrite(true).build().unwrap());
        deployer.run(parse_manifests(JOB_POD).unwrap()).unwrap();

        let console = console_of(&deployer);
        assert!(!console.iter().any(|line| line.contains("Deleted")));
        assert!(console.contains(&"# Pod migrate created".to_string()));
    }

    #[test]
    fn test_dry_run_sends_no_mutations() {
        let cluster = FakeCluster::new();
        cluster.insert(
            Document::try_from(json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "ns",
                             "labels": {"app": "demo", "version": "v2"}}
            }))
            .unwrap(),
        );
        let deployer = deployer(
            &cluster,
            options().dry_run(true).delete_old_versions(true).build().unwrap(),
        );
        deployer.run(parse_manifests(MANIFESTS).unwrap()).unwrap();

        assert!(cluster.mutations().is_empty());
        let console = console_of(&deployer);
        assert!(console.contains(&"# ConfigMap web-config would be created".to_string()));
        assert!(console.contains(&"# Deployment web would conflict with the existing resource".to_string()));
        assert!(!console.iter().any(|line| line.starts_with("#### Waiting")));
    }
}
