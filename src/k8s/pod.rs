//! Pod container status streaming and container-level waits

use std::collections::HashSet;
use std::time::Duration;

use super::client::KubernetesApi;
use super::error::{DeployError, KubeError};
use super::resource::Reference;
use crate::document::{Document, Node};
use crate::utils::logger::Console;
use crate::utils::wait::Poller;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SeenKey {
    State {
        container: String,
        state: String,
        reason: String,
    },
    Message {
        container: String,
        message: String,
    },
}

/// Container conditions already printed during one wait
#[derive(Debug, Default)]
pub struct SeenMessages {
    seen: HashSet<SeenKey>,
}

impl SeenMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn insert(&mut self, key: SeenKey) -> bool {
        self.seen.insert(key)
    }
}

/// Print every container state of `pod` not printed before.
///
/// Each (container, state, reason) triple is printed once, and each
/// distinct (container, message) pair once, even while the state repeats.
pub fn print_status(pod: &Document, seen: &mut SeenMessages, console: &Console) {
    let pod_name = pod.name().unwrap_or_default();
    let statuses = pod.get("status.containerStatuses").items();
    let init_statuses = pod.get("status.initContainerStatuses").items();

    for status in statuses.chain(init_statuses) {
        let last_terminated = status.path("lastState.terminated");
        if !last_terminated.is_empty() {
            print_state(pod_name, status, "terminated", last_terminated, seen, console);
        }
        for (state_name, state) in status.key("state").entries() {
            if !state.is_empty() {
                print_state(pod_name, status, state_name, state, seen, console);
            }
        }
    }
}

fn print_state(
    pod_name: &str,
    status: Node<'_>,
    state_name: &str,
    state: Node<'_>,
    seen: &mut SeenMessages,
    console: &Console,
) {
    // a terminated state without startedAt never ran
    if state_name == "terminated" && state.key("startedAt").is_absent() {
        return;
    }
    let container_name = status.key("name").as_str().unwrap_or_default();
    let container = status
        .key("containerID")
        .as_str()
        .unwrap_or(container_name)
        .to_string();
    let reason = state.key("reason").as_str().unwrap_or_default();

    let state_key = SeenKey::State {
        container: container.clone(),
        state: state_name.to_string(),
        reason: reason.to_string(),
    };
    if seen.insert(state_key) {
        tracing::debug!(pod = pod_name, container = container_name, state = %state.to_document(), "container state");
        let mut text = state_name.to_string();
        if !reason.is_empty() {
            text.push_str(" // ");
            text.push_str(reason);
        }
        console.line(format!("# Container {}/{}: {}", pod_name, container_name, text));
    }

    if let Some(message) = state.key("message").as_str().filter(|m| !m.is_empty()) {
        let message_key = SeenKey::Message {
            container,
            message: message.to_string(),
        };
        if seen.insert(message_key) {
            console.indented(message);
        }
    }
}

/// Expected outcome of [`Reference::wait_for_container`]
#[derive(Debug, Clone, Copy)]
pub struct ContainerWait<'a> {
    pub container: &'a str,
    /// `waiting`, `running`, or `terminated`
    pub state: &'a str,
    pub exit_code: Option<i64>,
    /// Give up once the restart count reaches this value
    pub max_restarts: Option<i64>,
}

impl Reference {
    /// Poll the pod until `expected.container` is in `expected.state`.
    ///
    /// Returns the matching state object. Once the restart cap is reached the
    /// current value of that state (possibly empty) is returned instead of
    /// waiting out the deadline.
    pub fn wait_for_container(
        &self,
        api: &KubernetesApi,
        console: &Console,
        poller: &Poller,
        expected: ContainerWait<'_>,
        timeout: Duration,
    ) -> Result<Document, DeployError> {
        let mut seen = SeenMessages::new();
        console.section(format!(
            "Waiting for container {}/{}",
            self.name, expected.container
        ));

        poller.poll(
            timeout,
            || {
                let pod = self.read(api)?;
                print_status(&pod, &mut seen, console);

                let status = pod
                    .get("status.containerStatuses")
                    .items()
                    .find(|status| status.key("name") == expected.container);
                let Some(status) = status else {
                    return Ok(None);
                };

                let state = status.path("state").key(expected.state);
                let restarts = status.key("restartCount").as_i64().unwrap_or(0);
                if let Some(max) = expected.max_restarts
                    && restarts >= max
                {
                    console.section(format!("Abort due to pod restart count: {}", restarts));
                    return Ok(Some(state.to_document()));
                }
                if state.is_empty() {
                    return Ok(None);
                }
                match expected.exit_code {
                    Some(code) if state.key("exitCode").as_i64() != Some(code) => Ok(None),
                    _ => Ok(Some(state.to_document())),
                }
            },
            || DeployError::WaitTimeout {
                target: self.name.clone(),
            },
        )
    }

    /// Full log of one container of this pod
    pub fn read_log(&self, api: &KubernetesApi, container: &str) -> Result<String, KubeError> {
        api.read_pod_log(&self.name, &self.namespace, Some(container), None)
    }
}
