//! Cluster connection settings: API server address, credentials, and namespace

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::{Path, PathBuf};

use super::error::KubeError;
use crate::config::settings::ClusterSettings;
use crate::document::{Document, Node};

/// Client certificate and key used for mutual TLS
#[derive(Clone)]
pub struct ClientIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity").finish_non_exhaustive()
    }
}

/// Everything needed to reach the API server
#[derive(Debug, Clone, Default)]
pub struct ClusterConfig {
    /// Base URL such as `https://10.0.0.1:6443`
    pub server: String,
    pub token: Option<String>,
    pub client_identity: Option<ClientIdentity>,
    pub ca_cert_pem: Option<Vec<u8>>,
    pub insecure: bool,
    /// Namespace of the selected kubeconfig context, if any
    pub namespace: Option<String>,
}

impl ClusterConfig {
    /// Pick a configuration source.
    ///
    /// An explicit kubeconfig path wins, then `KUBECONFIG` or
    /// `~/.kube/config`, and finally the in-cluster service account.
    pub fn discover(
        kubeconfig: Option<&Path>,
        settings: &ClusterSettings,
    ) -> Result<Self, KubeError> {
        if let Some(path) = kubeconfig {
            return Self::from_kubeconfig(Some(path));
        }
        if std::env::var_os("KUBECONFIG").is_some() || default_kubeconfig().is_some_and(|p| p.exists())
        {
            return Self::from_kubeconfig(None);
        }
        if Path::new(&settings.token_file).exists() {
            return Self::in_cluster(settings);
        }
        Err(KubeError::Config(
            "Kubernetes configuration not found (no kubeconfig and no service account)".to_string(),
        ))
    }

    /// Service-account credentials mounted into a pod
    pub fn in_cluster(settings: &ClusterSettings) -> Result<Self, KubeError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").unwrap_or_else(|_| settings.host.clone());
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(settings.port);

        let token = read_text(Path::new(&settings.token_file))?;
        let ca_path = Path::new(&settings.ca_cert);
        let ca_cert_pem = if ca_path.exists() {
            Some(read_bytes(ca_path)?)
        } else {
            None
        };

        Ok(Self {
            server: format!("https://{}:{}", host, port),
            token: Some(token.trim().to_string()),
            client_identity: None,
            ca_cert_pem,
            insecure: false,
            namespace: None,
        })
    }

    /// Load the current context of a kubeconfig file.
    ///
    /// With no path, `KUBECONFIG` (possibly several merged files) or
    /// `~/.kube/config` is read.
    pub fn from_kubeconfig(path: Option<&Path>) -> Result<Self, KubeError> {
        let kubeconfig = match path {
            Some(path) => kube::config::Kubeconfig::read_from(path),
            None => kube::config::Kubeconfig::read(),
        }
        .map_err(|e| KubeError::Config(format!("failed to read kubeconfig: {}", e)))?;

        let value = serde_json::to_value(&kubeconfig)
            .map_err(|e| KubeError::Config(format!("failed to read kubeconfig: {}", e)))?;
        let doc = Document::try_from(value)
            .map_err(|e| KubeError::Config(format!("failed to read kubeconfig: {}", e)))?;

        Self::from_kubeconfig_document(&doc)
    }

    /// Resolve the current context from a kubeconfig already in document form
    pub fn from_kubeconfig_document(doc: &Document) -> Result<Self, KubeError> {
        let context_name = doc
            .str("current-context")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| KubeError::Config("kubeconfig has no current-context".to_string()))?;
        let context = find_named(doc.get("contexts"), context_name).key("context");
        if context.is_absent() {
            return Err(KubeError::Config(format!(
                "context '{}' not found in kubeconfig",
                context_name
            )));
        }

        let cluster_name = context.key("cluster").as_str().unwrap_or_default();
        let cluster = find_named(doc.get("clusters"), cluster_name).key("cluster");
        let server = cluster.key("server").as_str().ok_or_else(|| {
            KubeError::Config(format!("cluster '{}' has no server address", cluster_name))
        })?;

        let user = match context.key("user").as_str() {
            Some(user) => find_named(doc.get("users"), user).key("user"),
            None => Node::Absent,
        };

        let token = match (user.key("token").as_str(), user.key("tokenFile").as_str()) {
            (Some(token), _) => Some(token.to_string()),
            (None, Some(file)) => Some(read_text(Path::new(file))?.trim().to_string()),
            (None, None) => None,
        };

        let cert = inline_or_file(user, "client-certificate-data", "client-certificate")?;
        let key = inline_or_file(user, "client-key-data", "client-key")?;
        let client_identity = match (cert, key) {
            (Some(cert_pem), Some(key_pem)) => Some(ClientIdentity { cert_pem, key_pem }),
            _ => None,
        };

        Ok(Self {
            server: server.to_string(),
            token,
            client_identity,
            ca_cert_pem: inline_or_file(
                cluster,
                "certificate-authority-data",
                "certificate-authority",
            )?,
            insecure: cluster.key("insecure-skip-tls-verify").as_bool().unwrap_or(false),
            namespace: context
                .key("namespace")
                .as_str()
                .filter(|ns| !ns.is_empty())
                .map(str::to_string),
        })
    }
}

/// Pick the namespace for this run.
///
/// Order: explicit option, service-account namespace file, kubeconfig
/// context namespace.
pub fn resolve_namespace(
    explicit: Option<&str>,
    settings: &ClusterSettings,
    config: &ClusterConfig,
) -> Result<String, KubeError> {
    if let Some(ns) = explicit.filter(|ns| !ns.is_empty()) {
        return Ok(ns.to_string());
    }
    let namespace_file = Path::new(&settings.namespace_file);
    if namespace_file.exists() {
        let ns = read_text(namespace_file)?;
        let ns = ns.trim();
        if !ns.is_empty() {
            return Ok(ns.to_string());
        }
    }
    config.namespace.clone().ok_or_else(|| {
        KubeError::Config(
            "Unable to determine namespace from Kubernetes configuration. Use --namespace option."
                .to_string(),
        )
    })
}

fn default_kubeconfig() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}

fn find_named<'a>(list: Node<'a>, name: &str) -> Node<'a> {
    list.items()
        .find(|item| item.key("name") == name)
        .unwrap_or(Node::Absent)
}

/// Read PEM data given either inline (base64) or as a file path
fn inline_or_file(node: Node<'_>, data_key: &str, file_key: &str) -> Result<Option<Vec<u8>>, KubeError> {
    if let Some(data) = node.key(data_key).as_str() {
        let decoded = BASE64
            .decode(data.trim())
            .map_err(|e| KubeError::Config(format!("invalid base64 in {}: {}", data_key, e)))?;
        return Ok(Some(decoded));
    }
    match node.key(file_key).as_str() {
        Some(path) => Ok(Some(read_bytes(Path::new(path))?)),
        None => Ok(None),
    }
}

fn read_text(path: &Path) -> Result<String, KubeError> {
    std::fs::read_to_string(path)
        .map_err(|e| KubeError::Config(format!("failed to read {}: {}", path.display(), e)))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, KubeError> {
    std::fs::read(path)
        .map_err(|e| KubeError::Config(format!("failed to read {}: {}", path.display(), e)))
}
