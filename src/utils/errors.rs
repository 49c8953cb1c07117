//! Enhanced error types with actionable suggestions

use colored::Colorize;
use thiserror::Error;

use crate::k8s::error::{DeployError, KubeError};

/// Enhanced error with suggestions
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DeployFailure {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl DeployFailure {
    /// Create a new error with suggestions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    /// Add a suggestion to the error
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        eprintln!("{} {}", "Error:".red().bold(), self.message);

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &self.suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }
    }

    // Common error patterns

    pub fn already_exists(message: String) -> Self {
        Self::new(message)
            .suggest("Pass --overwrite to replace the existing object")
            .suggest("Or deploy under a new version with --set-version")
    }

    pub fn deploy_timeout(message: String) -> Self {
        Self::new(message)
            .suggest("Check the container states printed above")
            .suggest("Increase the timeout with --wait SECONDS")
            .suggest("Skip waiting with --no-wait")
    }

    pub fn container_failed(message: String, pod: &str) -> Self {
        Self::new(message)
            .suggest("The container log is printed above")
            .suggest(format!("The pod was kept for inspection: kubectl describe pod {}", pod))
    }

    pub fn unknown_kind(message: String) -> Self {
        Self::new(message)
            .suggest("List known kinds with: kube-deploy api-resources")
            .suggest("Discover custom resources with: kube-deploy api-resources --refresh")
    }

    pub fn configuration(message: String) -> Self {
        Self::new(message)
            .suggest("Pass --kubeconfig or set KUBECONFIG")
            .suggest("Pass --namespace if the context has no namespace")
    }

    pub fn permission_denied(message: String) -> Self {
        Self::new(message)
            .suggest("Verify the service account or user may manage these resources")
            .suggest("Check with: kubectl auth can-i --list")
    }
}

/// Helper to display error and exit
pub fn display_error_and_exit(error: DeployFailure) -> ! {
    error.display();
    std::process::exit(1);
}

/// Attach suggestions based on the deploy or API error in the chain
pub fn enhance_error(err: anyhow::Error) -> DeployFailure {
    let message = format!("{:#}", err);

    for cause in err.chain() {
        if let Some(deploy) = cause.downcast_ref::<DeployError>() {
            return match deploy {
                DeployError::AlreadyExists(_) => DeployFailure::already_exists(message),
                DeployError::DeployTimeout { .. } | DeployError::WaitTimeout { .. } => {
                    DeployFailure::deploy_timeout(message)
                }
                DeployError::ContainerFailed { pod, .. } => {
                    DeployFailure::container_failed(message, pod)
                }
                DeployError::Kube(kube) => for_kube_error(kube, message),
            };
        }
        if let Some(kube) = cause.downcast_ref::<KubeError>() {
            return for_kube_error(kube, message);
        }
    }

    generic(message)
}

fn for_kube_error(err: &KubeError, message: String) -> DeployFailure {
    match err {
        KubeError::UnknownKind(_) => DeployFailure::unknown_kind(message),
        KubeError::Config(_) => DeployFailure::configuration(message),
        _ if matches!(err.status(), Some(401) | Some(403)) => {
            DeployFailure::permission_denied(message)
        }
        _ => generic(message),
    }
}

fn generic(message: String) -> DeployFailure {
    DeployFailure::new(message).suggest("Run with -vv for more details")
}
