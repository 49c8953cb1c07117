//! kube-deploy: versioned deployments of Kubernetes manifests
//!
//! Manifests are applied in a fixed kind order, stamped with a per-run
//! `update-id`, and optionally followed by a readiness wait and pruning of
//! other versions of the same application.

pub mod commands;
pub mod config;
pub mod document;
pub mod k8s;
pub mod utils;

#[cfg(test)]
mod testing;
