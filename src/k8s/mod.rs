//! Kubernetes operations

pub mod catalog;
pub mod client;
pub mod connection;
pub mod controller;
pub mod error;
pub mod pod;
pub mod resource;
pub mod selector;
pub mod transport;

pub use catalog::ApiResourceCatalog;
pub use client::KubernetesApi;
pub use error::{DeployError, KubeError};
pub use selector::Selector;
