//! Pod specification and status snapshot types.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ClusterError;
use crate::error::Result;

/// Identity of a pod once the platform has confirmed it exists.
///
/// Zero-valued (`Default`) when the platform returned no pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodIdentity {
    /// Namespace the pod lives in.
    pub namespace: String,
    /// Cluster-assigned unique ID.
    pub uid: String,
    /// Pod name.
    pub name: String,
}

impl PodIdentity {
    pub fn new(namespace: impl Into<String>, uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            uid: uid.into(),
            name: name.into(),
        }
    }

    /// True for the zero value handed out when no pod was returned.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One container of a pod request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Self::default()
        }
    }
}

/// Pod creation request for one step.
///
/// Produced by the pod-spec builder; the engine treats it as opaque apart
/// from the name and namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Containers that run to completion, in order, before the app containers.
    #[serde(default)]
    pub init_containers: Vec<ContainerSpec>,
    pub containers: Vec<ContainerSpec>,
}

impl PodSpec {
    /// Check the invariants every platform relies on.
    ///
    /// A pod needs a name, a namespace, at least one app container, and
    /// container names unique across init and app containers. Label values
    /// must be valid Kubernetes label values.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ClusterError::InvalidPodSpec {
            name: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("pod name cannot be empty".to_string()));
        }
        if self.namespace.is_empty() {
            return Err(invalid("namespace cannot be empty".to_string()));
        }
        if self.containers.is_empty() {
            return Err(invalid("at least one app container is required".to_string()));
        }

        let mut seen = HashSet::new();
        for container in self.init_containers.iter().chain(&self.containers) {
            if container.name.is_empty() {
                return Err(invalid("container name cannot be empty".to_string()));
            }
            if !seen.insert(container.name.as_str()) {
                return Err(invalid(format!("duplicate container name '{}'", container.name)));
            }
        }

        for (key, value) in &self.labels {
            if !is_label_value(value) {
                return Err(invalid(format!("label '{key}' has invalid value '{value}'")));
            }
        }

        Ok(())
    }
}

/// Empty, or at most 63 characters of `[A-Za-z0-9._-]` starting and ending alphanumeric.
fn is_label_value(value: &str) -> bool {
    let bytes = value.as_bytes();
    match (bytes.first(), bytes.last()) {
        (None, _) | (_, None) => true,
        (Some(first), Some(last)) => {
            bytes.len() <= 63
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        }
    }
}

/// Lifecycle phase of a whole pod.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    Unknown,
}

impl PodPhase {
    /// A terminal pod never changes its container statuses again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl From<&str> for PodPhase {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingInfo {
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningInfo {
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminatedInfo {
    pub exit_code: i32,
    pub reason: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Container state as reported by the platform.
///
/// Platforms may populate more than one branch during transitions; readers
/// pick the first present branch in waiting, running, terminated order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedState {
    pub waiting: Option<WaitingInfo>,
    pub running: Option<RunningInfo>,
    pub terminated: Option<TerminatedInfo>,
}

/// Reported status of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
    pub restart_count: u32,
    pub state: ReportedState,
}

impl ContainerStatus {
    /// Container with no state branch reported yet.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Container waiting to start, e.g. while its image is pulled.
    pub fn waiting(name: impl Into<String>, reason: &str) -> Self {
        Self {
            name: name.into(),
            state: ReportedState {
                waiting: Some(WaitingInfo {
                    reason: Some(reason.to_string()),
                    message: None,
                }),
                ..ReportedState::default()
            },
            ..Self::default()
        }
    }

    /// Running container with the given readiness.
    pub fn running(name: impl Into<String>, ready: bool) -> Self {
        Self {
            name: name.into(),
            ready,
            state: ReportedState {
                running: Some(RunningInfo { started_at: None }),
                ..ReportedState::default()
            },
            ..Self::default()
        }
    }

    /// Container that exited with `exit_code`.
    pub fn terminated(name: impl Into<String>, exit_code: i32) -> Self {
        Self {
            name: name.into(),
            state: ReportedState {
                terminated: Some(TerminatedInfo {
                    exit_code,
                    reason: Some(if exit_code == 0 { "Completed" } else { "Error" }.to_string()),
                    finished_at: None,
                }),
                ..ReportedState::default()
            },
            ..Self::default()
        }
    }

    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    pub fn with_restarts(mut self, restart_count: u32) -> Self {
        self.restart_count = restart_count;
        self
    }
}

/// Full status of one pod at one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatusSnapshot {
    pub identity: PodIdentity,
    pub phase: PodPhase,
    pub init_container_statuses: Vec<ContainerStatus>,
    pub container_statuses: Vec<ContainerStatus>,
}
