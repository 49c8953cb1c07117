//! Kubernetes API error classification

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubeError {
    #[error("unknown resource kind '{0}'")]
    UnknownKind(String),

    #[error("{method} {path}: not found")]
    NotFound { method: String, path: String },

    #[error("{method} {path} status_code={status} message={message}")]
    Api {
        method: String,
        path: String,
        status: u16,
        message: String,
    },

    #[error("{method} {path}: request failed: {source}")]
    Transport {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cluster configuration error: {0}")]
    Config(String),
}

/// Failures of the deployment workflow built on top of the API client
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("{0} already exists with a version label, use --overwrite to replace it")]
    AlreadyExists(String),

    #[error("timed out waiting for deployment {selector}")]
    DeployTimeout { selector: String },

    #[error("timed out waiting for {target}")]
    WaitTimeout { target: String },

    #[error("container {pod}/{container} exited with code {exit_code}")]
    ContainerFailed {
        pod: String,
        container: String,
        exit_code: i64,
    },

    #[error(transparent)]
    Kube(#[from] KubeError),
}

impl KubeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::NotFound { .. })
    }

    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            KubeError::NotFound { .. } => Some(404),
            KubeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build the error for a non-2xx response.
    ///
    /// The server message is taken from a JSON `Status` body when there is
    /// one, otherwise the raw text is kept.
    pub fn from_response(method: &str, path: &str, status: u16, body: &str) -> Self {
        if status == 404 {
            return KubeError::NotFound {
                method: method.to_string(),
                path: path.to_string(),
            };
        }
        KubeError::Api {
            method: method.to_string(),
            path: path.to_string(),
            status,
            message: server_message(body),
        }
    }
}

fn server_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
