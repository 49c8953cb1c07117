//! HTTP transport for the Kubernetes REST API

use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use super::connection::ClusterConfig;
use super::error::KubeError;

/// HTTP verbs used against the API server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    /// Verbs that change cluster state and are skipped in dry-run mode
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Verb::Get)
    }

    fn method(&self) -> reqwest::Method {
        match self {
            Verb::Get => reqwest::Method::GET,
            Verb::Post => reqwest::Method::POST,
            Verb::Put => reqwest::Method::PUT,
            Verb::Patch => reqwest::Method::PATCH,
            Verb::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content type for JSON merge patches
pub const MERGE_PATCH: &str = "application/merge-patch+json";
pub const JSON: &str = "application/json";

/// A single request against the API server, path rooted at `/`
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub verb: Verb,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub content_type: &'static str,
}

impl ApiRequest {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            query: Vec::new(),
            body: None,
            content_type: JSON,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value, content_type: &'static str) -> Self {
        self.body = Some(body);
        self.content_type = content_type;
        self
    }
}

/// Raw server answer: status code and body text
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request and returns the raw response.
///
/// Implementations are stateless per call; classification of the response
/// happens in the client.
pub trait Transport: Send + Sync {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, KubeError>;
}

/// Blocking HTTPS transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    server: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClusterConfig, timeout: Duration) -> Result<Self, KubeError> {
        let mut builder = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .timeout(timeout);

        if let Some(ca) = &config.ca_cert_pem {
            let certs = reqwest::Certificate::from_pem_bundle(ca)
                .map_err(|e| KubeError::Config(format!("invalid CA bundle: {}", e)))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let Some(identity) = &config.client_identity {
            let mut pem = identity.cert_pem.clone();
            pem.push(b'\n');
            pem.extend_from_slice(&identity.key_pem);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| KubeError::Config(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| KubeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            server: config.server.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, KubeError> {
        let url = format!("{}{}", self.server, request.path);
        let transport_error = |source| KubeError::Transport {
            method: request.verb.to_string(),
            path: request.path.clone(),
            source,
        };

        let mut builder = self
            .client
            .request(request.verb.method(), &url)
            .query(&request.query);

        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body).map_err(|source| KubeError::Decode {
                path: request.path.clone(),
                source,
            })?;
            builder = builder.header(CONTENT_TYPE, request.content_type).body(bytes);
        }

        let response = builder.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(transport_error)?;

        Ok(ApiResponse { status, body })
    }
}
