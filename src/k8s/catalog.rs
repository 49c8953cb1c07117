//! Resource kind catalog: kind -> REST plural, API group, and scope

use arc_swap::ArcSwap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::client::KubernetesApi;
use super::error::KubeError;
use crate::document::Node;

/// Bootstrap table in `kubectl api-resources -o wide` format
const STANDARD_API_RESOURCES: &str = include_str!("standard_api_resources.txt");

/// REST addressing metadata for one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub kind: String,
    /// Plural REST name (`deployments`)
    pub plural: String,
    pub short_names: Vec<String>,
    /// `v1` for the core group, `<group>/<version>` otherwise
    pub group_version: String,
    pub namespaced: bool,
    pub verbs: Vec<String>,
}

impl ResourceDescriptor {
    /// API group name, empty for the core group
    pub fn group(&self) -> &str {
        self.group_version
            .split_once('/')
            .map(|(group, _)| group)
            .unwrap_or("")
    }

    /// Path prefix without leading slash: `api/v1` or `apis/<group>/<version>`
    pub fn api_prefix(&self) -> String {
        api_prefix(&self.group_version)
    }
}

/// Path prefix for an `apiVersion` value
pub fn api_prefix(group_version: &str) -> String {
    if group_version.contains('/') {
        format!("apis/{}", group_version)
    } else {
        format!("api/{}", group_version)
    }
}

type KindTable = HashMap<String, Arc<ResourceDescriptor>>;

/// Kind lookup table shared by every client call.
///
/// Reads are lock-free; [`refresh`](Self::refresh) swaps in a complete new
/// table or leaves the current one untouched.
pub struct ApiResourceCatalog {
    table: ArcSwap<KindTable>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for ApiResourceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiResourceCatalog")
            .field("kinds", &self.descriptors().len())
            .finish_non_exhaustive()
    }
}

impl ApiResourceCatalog {
    /// Catalog of the standard Kubernetes kinds compiled into the binary
    pub fn standard() -> Self {
        Self::from_descriptors(parse_api_resources(STANDARD_API_RESOURCES))
    }

    /// Catalog from a table in `kubectl api-resources -o wide` format
    pub fn from_table(text: &str) -> Result<Self, KubeError> {
        let descriptors = parse_api_resources(text);
        if descriptors.is_empty() {
            return Err(KubeError::Config(
                "api resources table has no entries".to_string(),
            ));
        }
        Ok(Self::from_descriptors(descriptors))
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> Self {
        Self {
            table: ArcSwap::from_pointee(build_table(descriptors)),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Resolve a kind, trying the exact spelling first and then lowercase.
    pub fn resolve(&self, kind: &str) -> Result<Arc<ResourceDescriptor>, KubeError> {
        let table = self.table.load();
        table
            .get(kind)
            .or_else(|| table.get(&kind.to_lowercase()))
            .cloned()
            .ok_or_else(|| KubeError::UnknownKind(kind.to_string()))
    }

    /// All descriptors, one per kind, sorted by group then plural name
    pub fn descriptors(&self) -> Vec<Arc<ResourceDescriptor>> {
        let table = self.table.load();
        let mut unique: Vec<Arc<ResourceDescriptor>> = table
            .iter()
            .filter(|(key, descriptor)| **key == descriptor.kind)
            .map(|(_, descriptor)| Arc::clone(descriptor))
            .collect();
        unique.sort_by(|a, b| (a.group(), &a.plural).cmp(&(b.group(), &b.plural)));
        unique
    }

    /// Atomically replace the whole table.
    pub fn replace(&self, descriptors: impl IntoIterator<Item = ResourceDescriptor>) {
        self.table.store(Arc::new(build_table(descriptors)));
    }

    /// Re-read the kind table from the cluster discovery endpoints.
    ///
    /// Concurrent refreshes are serialized. Any failure leaves the current
    /// table in place. Returns the number of kinds discovered.
    pub fn refresh(&self, api: &KubernetesApi) -> Result<usize, KubeError> {
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut descriptors = Vec::new();

        let core = api.get_path("/api/v1")?;
        descriptors.extend(parse_resource_list(core.root()));

        let groups = api.get_path("/apis")?;
        for group in groups.get("groups").items() {
            let Some(group_version) = group.path("preferredVersion.groupVersion").as_str() else {
                continue;
            };
            let list = api.get_path(&format!("/apis/{}", group_version))?;
            descriptors.extend(parse_resource_list(list.root()));
        }

        let count = descriptors.len();
        tracing::debug!(kinds = count, "discovered api resources");
        self.replace(descriptors);
        Ok(count)
    }
}

fn build_table(descriptors: impl IntoIterator<Item = ResourceDescriptor>) -> KindTable {
    let mut table = KindTable::new();
    for descriptor in descriptors {
        if table.contains_key(&descriptor.kind) {
            // first group wins, matching kubectl's preference for core kinds
            continue;
        }
        let descriptor = Arc::new(descriptor);
        table.insert(descriptor.kind.to_lowercase(), Arc::clone(&descriptor));
        table.insert(descriptor.kind.clone(), descriptor);
    }
    table
}

/// Parse an `APIResourceList` discovery document.
fn parse_resource_list(list: Node<'_>) -> Vec<ResourceDescriptor> {
    let Some(group_version) = list.key("groupVersion").as_str() else {
        return Vec::new();
    };
    list.key("resources")
        .items()
        .filter_map(|resource| {
            let plural = resource.key("name").as_str()?;
            if plural.contains('/') {
                // subresource such as pods/log
                return None;
            }
            Some(ResourceDescriptor {
                kind: resource.key("kind").as_str()?.to_string(),
                plural: plural.to_string(),
                short_names: strings(resource.key("shortNames")),
                group_version: group_version.to_string(),
                namespaced: resource.key("namespaced").as_bool().unwrap_or(false),
                verbs: strings(resource.key("verbs")),
            })
        })
        .collect()
}

fn strings(node: Node<'_>) -> Vec<String> {
    node.items()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// Parse fixed-width `kubectl api-resources -o wide` output.
///
/// Column boundaries come from the header line. Both the `APIVERSION`
/// column and the older `APIGROUP` column are understood; a bare group is
/// assumed to serve `v1`.
pub fn parse_api_resources(text: &str) -> Vec<ResourceDescriptor> {
    let column_re = Regex::new(r"\S+\s*").expect("static regex");
    let mut header: Option<Vec<(String, usize, Option<usize>)>> = None;
    let mut descriptors = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let Some(columns) = &header else {
            let matches: Vec<_> = column_re.find_iter(line).collect();
            let last = matches.len().saturating_sub(1);
            header = Some(
                matches
                    .iter()
                    .enumerate()
                    .map(|(i, m)| {
                        let end = (i < last).then_some(m.end());
                        (m.as_str().trim_end().to_string(), m.start(), end)
                    })
                    .collect(),
            );
            continue;
        };

        let fields: HashMap<&str, &str> = columns
            .iter()
            .map(|(label, start, end)| {
                let value = match end {
                    Some(end) => line.get(*start..(*end).min(line.len())),
                    None => line.get(*start..),
                };
                (label.as_str(), value.unwrap_or("").trim())
            })
            .collect();

        let field = |name: &str| fields.get(name).copied().unwrap_or("");
        let group_version = match (field("APIVERSION"), field("APIGROUP")) {
            (version, _) if !version.is_empty() => version.to_string(),
            (_, group) if !group.is_empty() => format!("{}/v1", group),
            _ => "v1".to_string(),
        };
        let kind = field("KIND");
        let plural = field("NAME");
        if kind.is_empty() || plural.is_empty() {
            continue;
        }

        descriptors.push(ResourceDescriptor {
            kind: kind.to_string(),
            plural: plural.to_string(),
            short_names: split_list(field("SHORTNAMES"), ','),
            group_version,
            namespaced: field("NAMESPACED") == "true",
            verbs: split_list(field("VERBS").trim_matches(['[', ']']), ' '),
        });
    }

    descriptors
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
