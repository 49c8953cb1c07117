//! In-memory cluster and clock for unit tests

use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::document::Document;
use crate::k8s::catalog::ApiResourceCatalog;
use crate::k8s::client::KubernetesApi;
use crate::k8s::error::KubeError;
use crate::k8s::transport::{ApiRequest, ApiResponse, Transport, Verb};
use crate::utils::wait::Clock;

/// Clock whose `sleep` advances time instantly
pub struct FakeClock {
    start: Instant,
    elapsed: Mutex<Duration>,
    sleeps: AtomicUsize,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: AtomicUsize::new(0),
        }
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.fetch_add(1, Ordering::SeqCst);
    }
}

type ObjectKey = (String, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, Value>,
    discovery: HashMap<String, Value>,
    logs: HashMap<(String, String), String>,
    requests: Vec<(Verb, String)>,
    failures: Vec<(Option<Verb>, u16, String)>,
    counter: u64,
    workloads: Option<i64>,
}

/// A fake API server.
///
/// Objects are keyed by plural, namespace, and name; the group version in the
/// path is ignored. Lists honor label selectors and strip `kind` and
/// `apiVersion` from items like the real server does. Merge patches only bump
/// `resourceVersion` when the stored object actually changes.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client bound to this cluster with the standard catalog
    pub fn api(&self) -> KubernetesApi {
        KubernetesApi::new(
            Arc::new(self.clone()),
            Arc::new(ApiResourceCatalog::standard()),
        )
    }

    /// Act as the workload controllers: a created or patched Deployment gets
    /// a ready ReplicaSet carrying its template labels, and a created Pod
    /// terminates at once with `exit_code`.
    pub fn simulate_workloads(&self, exit_code: i64) {
        self.lock().workloads = Some(exit_code);
    }

    /// Store an object directly, assigning uid and resourceVersion
    pub fn insert(&self, doc: Document) {
        let mut state = self.lock();
        let mut value = doc.to_primitive();
        let plural = plural_of(&value);
        let namespace = str_at(&value, &["metadata", "namespace"]);
        let name = str_at(&value, &["metadata", "name"]);
        state.stamp_new(&mut value);
        state.objects.insert((plural, namespace, name), value);
    }

    /// Current stored object, if any
    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<Document> {
        let plural = plural_for_kind(kind);
        self.lock()
            .objects
            .get(&(plural, namespace.to_string(), name.to_string()))
            .and_then(|value| Document::try_from(value.clone()).ok())
    }

    pub fn set_log(&self, namespace: &str, pod: &str, log: &str) {
        self.lock()
            .logs
            .insert((namespace.to_string(), pod.to_string()), log.to_string());
    }

    pub fn set_discovery(&self, path: &str, body: Value) {
        self.lock().discovery.insert(path.to_string(), body);
    }

    /// Make the next request with `verb` fail with the given status and body
    pub fn fail_next(&self, verb: Verb, status: u16, body: &str) {
        self.lock()
            .failures
            .push((Some(verb), status, body.to_string()));
    }

    /// Make the request to `path` fail once, whatever the verb
    pub fn fail_path(&self, path: &str, status: u16) {
        self.lock()
            .failures
            .push((None, status, format!("path:{}", path)));
    }

    /// Every request seen so far as (verb, path with query)
    pub fn requests(&self) -> Vec<(Verb, String)> {
        self.lock().requests.clone()
    }

    /// Requests other than GET
    pub fn mutations(&self) -> Vec<(Verb, String)> {
        self.requests()
            .into_iter()
            .filter(|(verb, _)| verb.is_mutating())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl Transport for FakeCluster {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, KubeError> {
        let mut state = self.lock();
        let mut journal = request.path.clone();
        if !request.query.is_empty() {
            let query: Vec<String> = request
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            journal = format!("{}?{}", journal, query.join("&"));
        }
        state.requests.push((request.verb, journal));

        if let Some(index) = state.failures.iter().position(|(verb, _, body)| match verb {
            Some(verb) => *verb == request.verb,
            None => body == &format!("path:{}", request.path),
        }) {
            let (_, status, body) = state.failures.remove(index);
            return Ok(ApiResponse { status, body });
        }

        Ok(state.handle(request))
    }
}

struct Route {
    plural: String,
    namespace: Option<String>,
    name: Option<String>,
    subresource: Option<String>,
}

fn route(path: &str) -> Option<Route> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let rest = match segments.first() {
        Some(&"api") => segments.get(2..)?,
        Some(&"apis") => segments.get(3..)?,
        _ => return None,
    };
    let (namespace, rest) = match rest {
        ["namespaces", ns, rest @ ..] if !rest.is_empty() => (Some(ns.to_string()), rest),
        _ => (None, rest),
    };
    let plural = rest.first()?.to_string();
    Some(Route {
        plural,
        namespace,
        name: rest.get(1).map(|s| s.to_string()),
        subresource: rest.get(2).map(|s| s.to_string()),
    })
}

fn respond(status: u16, body: Value) -> ApiResponse {
    ApiResponse {
        status,
        body: body.to_string(),
    }
}

fn status(code: u16, message: &str) -> ApiResponse {
    respond(
        code,
        json!({"kind": "Status", "status": "Failure", "message": message, "code": code}),
    )
}

impl State {
    fn handle(&mut self, request: &ApiRequest) -> ApiResponse {
        if request.verb == Verb::Get
            && let Some(body) = self.discovery.get(&request.path)
        {
            return respond(200, body.clone());
        }
        let Some(route) = route(&request.path) else {
            return status(404, "the server could not find the requested resource");
        };
        let namespace = route.namespace.clone().unwrap_or_default();

        match (request.verb, route.name.as_deref(), route.subresource.as_deref()) {
            (Verb::Get, None, _) => self.list(&route, request),
            (Verb::Get, Some(name), Some("log")) => {
                match self.logs.get(&(namespace, name.to_string())) {
                    Some(log) => ApiResponse {
                        status: 200,
                        body: log.clone(),
                    },
                    None => status(404, "pod log not found"),
                }
            }
            (Verb::Get, Some(name), _) => {
                match self.objects.get(&(route.plural.clone(), namespace, name.to_string())) {
                    Some(object) => respond(200, object.clone()),
                    None => status(404, &format!("{} \"{}\" not found", route.plural, name)),
                }
            }
            (Verb::Post, None, _) => self.create(&route, request),
            (Verb::Patch, Some(name), _) | (Verb::Put, Some(name), _) => {
                self.update(&route, name, request)
            }
            (Verb::Delete, Some(name), _) => {
                match self.objects.remove(&(route.plural.clone(), namespace, name.to_string())) {
                    Some(object) => respond(200, object),
                    None => status(404, &format!("{} \"{}\" not found", route.plural, name)),
                }
            }
            _ => status(405, "method not allowed"),
        }
    }

    fn list(&self, route: &Route, request: &ApiRequest) -> ApiResponse {
        let selector = request
            .query
            .iter()
            .find(|(k, _)| k == "labelSelector")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let items: Vec<Value> = self
            .objects
            .iter()
            .filter(|((plural, ns, _), _)| {
                *plural == route.plural
                    && route.namespace.as_ref().is_none_or(|wanted| wanted == ns)
            })
            .filter(|(_, object)| selector_matches(&selector, &object["metadata"]["labels"]))
            .map(|(_, object)| {
                let mut item = object.clone();
                if let Some(map) = item.as_object_mut() {
                    map.remove("kind");
                    map.remove("apiVersion");
                }
                item
            })
            .collect();
        respond(200, json!({"kind": "List", "items": items}))
    }

    fn create(&mut self, route: &Route, request: &ApiRequest) -> ApiResponse {
        let mut object = request.body.clone().unwrap_or_else(|| json!({}));
        let name = str_at(&object, &["metadata", "name"]);
        let namespace = route.namespace.clone().unwrap_or_default();
        let key = (route.plural.clone(), namespace.clone(), name.clone());
        if self.objects.contains_key(&key) {
            return status(409, &format!("{} \"{}\" already exists", route.plural, name));
        }
        if route.namespace.is_some() {
            object["metadata"]["namespace"] = json!(namespace);
        }
        self.stamp_new(&mut object);
        self.objects.insert(key, object.clone());
        self.run_workloads(&route.plural, &namespace, &object);
        respond(201, object)
    }

    fn update(&mut self, route: &Route, name: &str, request: &ApiRequest) -> ApiResponse {
        let namespace = route.namespace.clone().unwrap_or_default();
        let key = (route.plural.clone(), namespace.clone(), name.to_string());
        let Some(current) = self.objects.get(&key).cloned() else {
            return status(404, &format!("{} \"{}\" not found", route.plural, name));
        };
        let body = request.body.clone().unwrap_or_else(|| json!({}));

        let mut updated = if request.verb == Verb::Patch {
            let mut merged = current.clone();
            merge_patch(&mut merged, &body);
            merged
        } else {
            body
        };
        updated["metadata"]["uid"] = current["metadata"]["uid"].clone();
        updated["metadata"]["creationTimestamp"] = current["metadata"]["creationTimestamp"].clone();
        updated["metadata"]["resourceVersion"] = current["metadata"]["resourceVersion"].clone();
        if updated != current {
            self.counter += 1;
            updated["metadata"]["resourceVersion"] = json!(self.counter.to_string());
        }
        self.objects.insert(key, updated.clone());
        if updated != current {
            self.run_workloads(&route.plural, &namespace, &updated);
        }
        respond(200, updated)
    }

    fn stamp_new(&mut self, object: &mut Value) {
        self.counter += 1;
        let n = self.counter;
        object["metadata"]["uid"] = json!(format!("uid-{}", n));
        object["metadata"]["resourceVersion"] = json!(n.to_string());
        object["metadata"]["creationTimestamp"] = json!(timestamp(n));
    }

    fn run_workloads(&mut self, plural: &str, namespace: &str, object: &Value) {
        let Some(exit_code) = self.workloads else {
            return;
        };
        let name = str_at(object, &["metadata", "name"]);
        match plural {
            "deployments" => {
                let replicas = object["spec"]["replicas"].as_i64().unwrap_or(1);
                let rs_name = format!("{}-{}", name, self.counter);
                let mut rs = json!({
                    "apiVersion": "apps/v1",
                    "kind": "ReplicaSet",
                    "metadata": {
                        "name": rs_name,
                        "namespace": namespace,
                        "labels": object["spec"]["template"]["metadata"]["labels"].clone()
                    },
                    "spec": {"replicas": replicas},
                    "status": {"replicas": replicas, "readyReplicas": replicas}
                });
                self.stamp_new(&mut rs);
                self.objects
                    .insert(("replicasets".to_string(), namespace.to_string(), rs_name), rs);
            }
            "pods" => {
                let container = str_at(object, &["spec", "containers", "0", "name"]);
                // a failing container is shown after its first restart
                let (phase, reason, restarts) = if exit_code == 0 {
                    ("Succeeded", "Completed", 0)
                } else {
                    ("Failed", "Error", 1)
                };
                let key = ("pods".to_string(), namespace.to_string(), name.clone());
                if let Some(pod) = self.objects.get_mut(&key) {
                    pod["status"] = json!({
                        "phase": phase,
                        "containerStatuses": [{
                            "name": container,
                            "containerID": format!("fake://{}", name),
                            "restartCount": restarts,
                            "state": {"terminated": {
                                "exitCode": exit_code,
                                "reason": reason,
                                "startedAt": timestamp(1)
                            }}
                        }]
                    });
                }
                self.logs
                    .insert((namespace.to_string(), name), "job output\n".to_string());
            }
            _ => {}
        }
    }
}

fn timestamp(n: u64) -> String {
    format!(
        "2024-01-01T{:02}:{:02}:{:02}Z",
        (n / 3600) % 24,
        (n / 60) % 60,
        n % 60
    )
}

/// Equality-based label selector as the API server evaluates it
fn selector_matches(selector: &str, labels: &Value) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels[key].as_str() != Some(value)
            } else if let Some((key, value)) = term.split_once('=') {
                labels[key].as_str() == Some(value)
            } else {
                !labels[term].is_null()
            }
        })
}

/// RFC 7386 JSON merge patch
fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

fn str_at(value: &Value, path: &[&str]) -> String {
    path.iter()
        .try_fold(value, |node, key| match node {
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => node.get(key),
        })
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn plural_of(value: &Value) -> String {
    plural_for_kind(value["kind"].as_str().unwrap_or_default())
}

fn plural_for_kind(kind: &str) -> String {
    ApiResourceCatalog::standard()
        .resolve(kind)
        .map(|descriptor| descriptor.plural.clone())
        .unwrap_or_else(|_| format!("{}s", kind.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_patch_only_bumps_on_change() {
        let cluster = FakeCluster::new();
        let api = cluster.api();
        let cm = Document::try_from(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "cfg", "namespace": "ns"},
            "data": {"a": "1"}
        }))
        .unwrap();
        let created = api.create(&cm).unwrap();
        let same = api.patch(&cm).unwrap();
        assert_eq!(
            created.str("metadata.resourceVersion"),
            same.str("metadata.resourceVersion")
        );

        let mut changed = cm.clone();
        changed.set("data.a", "2");
        let patched = api.patch(&changed).unwrap();
        assert_ne!(
            created.str("metadata.resourceVersion"),
            patched.str("metadata.resourceVersion")
        );
    }

    #[test]
    fn test_merge_patch_null_removes() {
        let mut target = json!({"a": {"b": 1, "c": 2}});
        merge_patch(&mut target, &json!({"a": {"b": null}}));
        assert_eq!(target, json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_selector_matches() {
        let labels = json!({"app": "demo", "version": "v2"});
        assert!(selector_matches("app=demo,version!=v3", &labels));
        assert!(!selector_matches("app=demo,version!=v2", &labels));
        assert!(selector_matches("update-id!=x", &labels));
        assert!(!selector_matches("update-id", &labels));
        assert!(selector_matches("", &labels));
    }
}
