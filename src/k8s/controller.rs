//! Multi-resource operations and waits scoped to one namespace

use std::sync::Arc;
use std::time::Duration;

use super::client::KubernetesApi;
use super::error::{DeployError, KubeError};
use super::pod::{SeenMessages, print_status};
use super::resource::{DeleteParams, Resource};
use super::selector::Selector;
use crate::document::Document;
use crate::utils::logger::Console;
use crate::utils::wait::Poller;

pub struct NamespaceController {
    api: Arc<KubernetesApi>,
    console: Console,
    poller: Poller,
    namespace: String,
}

impl NamespaceController {
    pub fn new(
        api: Arc<KubernetesApi>,
        console: Console,
        poller: Poller,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api,
            console,
            poller,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn api(&self) -> &KubernetesApi {
        &self.api
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Delete every object of `kind` matching `selector`, one by one.
    ///
    /// Returns the number of objects deleted.
    pub fn delete_resources(
        &self,
        kind: &str,
        selector: &Selector,
        params: &DeleteParams,
    ) -> Result<usize, KubeError> {
        let items = self.api.list(kind, Some(&self.namespace), selector)?;
        let mut deleted = 0;
        for item in items {
            let resource = Resource::new(item, self.api.catalog())?;
            if resource.delete(&self.api, &self.console, params)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Print container state changes of all pods matching `selector`
    pub fn print_pod_errors(
        &self,
        selector: &Selector,
        seen: &mut SeenMessages,
    ) -> Result<(), KubeError> {
        for pod in self.api.list("Pod", Some(&self.namespace), selector)? {
            print_status(&pod, seen, &self.console);
        }
        Ok(())
    }

    /// Wait until the newest ReplicaSet matching `selector` has at least
    /// `min_ready_replicas` ready pods.
    pub fn wait_for_deployment(
        &self,
        selector: &Selector,
        timeout: Duration,
        min_ready_replicas: i64,
    ) -> Result<(), DeployError> {
        let mut seen = SeenMessages::new();
        self.console
            .section(format!("Waiting for deployment(s) to start: {}", selector));

        self.poller.poll(
            timeout,
            || {
                let Some(replica_set) = self.newest("ReplicaSet", selector)? else {
                    return Ok(None);
                };
                let name = replica_set.name().unwrap_or_default();
                let status = self.api.get_status("ReplicaSet", name, Some(&self.namespace))?;
                let ready = status.get("status.readyReplicas").as_i64().unwrap_or(0);
                if ready >= min_ready_replicas {
                    return Ok(Some(()));
                }
                tracing::debug!(replica_set = name, ready_replicas = ready, "waiting for replicas");
                self.print_pod_errors(selector, &mut seen)?;
                Ok(None)
            },
            || DeployError::DeployTimeout {
                selector: selector.to_string(),
            },
        )
    }

    /// Wait until the newest pod matching `selector` reaches `Succeeded`.
    ///
    /// Any other phase, `Failed` included, keeps polling; failures show up
    /// through the streamed container states.
    pub fn wait_for_pod(&self, selector: &Selector, timeout: Duration) -> Result<(), DeployError> {
        let mut seen = SeenMessages::new();
        self.console
            .section(format!("Waiting for pod to complete: {}", selector));

        self.poller.poll(
            timeout,
            || {
                let Some(pod) = self.newest("Pod", selector)? else {
                    return Ok(None);
                };
                let name = pod.name().unwrap_or_default();
                let status = self.api.get_status("Pod", name, Some(&self.namespace))?;
                let phase = status.str("status.phase").unwrap_or_default();
                if phase == "Succeeded" {
                    return Ok(Some(()));
                }
                tracing::debug!(pod = name, phase, "waiting for pod");
                self.print_pod_errors(selector, &mut seen)?;
                Ok(None)
            },
            || DeployError::WaitTimeout {
                target: selector.to_string(),
            },
        )
    }

    /// Wait until listing `kind` with `selector` comes back empty
    pub fn wait_until_deleted(
        &self,
        kind: &str,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<(), DeployError> {
        let mut announced = false;
        self.poller.poll(
            timeout,
            || {
                if self.api.list(kind, Some(&self.namespace), selector)?.is_empty() {
                    return Ok(Some(()));
                }
                if !announced {
                    self.console
                        .line(format!("# Waiting for {} {} to terminate", kind, selector));
                    announced = true;
                } else {
                    tracing::debug!(kind, selector = %selector, "waiting to terminate");
                }
                Ok(None)
            },
            || DeployError::WaitTimeout {
                target: format!("{} {}", kind, selector),
            },
        )
    }

    /// Most recently created object of `kind` matching `selector`
    fn newest(&self, kind: &str, selector: &Selector) -> Result<Option<Document>, KubeError> {
        let items = self.api.list(kind, Some(&self.namespace), selector)?;
        Ok(newest(items))
    }
}

/// Pick the item with the latest `creationTimestamp`; ties go to the later
/// item in list order.
fn newest(items: Vec<Document>) -> Option<Document> {
    const CREATED: &str = "metadata.creationTimestamp";
    items.into_iter().reduce(|best, item| {
        if item.str(CREATED).unwrap_or_default() >= best.str(CREATED).unwrap_or_default() {
            item
        } else {
            best
        }
    })
}
