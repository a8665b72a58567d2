//! Observed container values.

use std::fmt;

use podline_cluster::ContainerStatus;
use podline_cluster::PodIdentity;
use podline_cluster::ReportedState;
use serde::Deserialize;
use serde::Serialize;

use crate::verified::derive_container_state;

/// Lifecycle state of one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerState {
    #[default]
    Unknown,
    Waiting,
    Running,
    Terminated,
}

impl ContainerState {
    /// Derive the state from a reported status.
    ///
    /// Exactly one state wins: Waiting if a wait reason is present, else
    /// Running if running info is present, else Terminated if termination
    /// info is present, else Unknown.
    pub fn from_status(state: &ReportedState) -> Self {
        derive_container_state(state.waiting.is_some(), state.running.is_some(), state.terminated.is_some())
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Whether a container belongs to the init or the app phase of its pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRole {
    Init,
    App,
}

/// One container of one pod, as last observed by a waiter.
///
/// Immutable: a new observation replaces the previous value wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitedContainer {
    /// Pod the container runs in; carries the namespace.
    pub pod: PodIdentity,
    pub name: String,
    pub role: ContainerRole,
    pub state: ContainerState,
    pub restart_count: u32,
    pub ready: bool,
    /// Exit code, set once the container is terminated.
    pub exit_code: Option<i32>,
}

impl AwaitedContainer {
    /// Build the observed value for `status` inside `pod`.
    pub fn observe(pod: &PodIdentity, role: ContainerRole, status: &ContainerStatus) -> Self {
        let state = ContainerState::from_status(&status.state);
        let exit_code = match state {
            ContainerState::Terminated => status.state.terminated.as_ref().map(|t| t.exit_code),
            _ => None,
        };

        Self {
            pod: pod.clone(),
            name: status.name.clone(),
            role,
            state,
            restart_count: status.restart_count,
            ready: status.ready,
            exit_code,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.pod.namespace
    }
}

#[cfg(test)]
mod tests {
    use podline_cluster::RunningInfo;
    use podline_cluster::TerminatedInfo;
    use podline_cluster::WaitingInfo;

    use super::*;

    #[test]
    fn test_waiting_wins_over_other_branches() {
        let state = ReportedState {
            waiting: Some(WaitingInfo::default()),
            running: Some(RunningInfo::default()),
            terminated: Some(TerminatedInfo::default()),
        };
        assert_eq!(ContainerState::from_status(&state), ContainerState::Waiting);
    }

    #[test]
    fn test_running_wins_over_terminated() {
        let state = ReportedState {
            running: Some(RunningInfo::default()),
            terminated: Some(TerminatedInfo::default()),
            ..ReportedState::default()
        };
        assert_eq!(ContainerState::from_status(&state), ContainerState::Running);
    }

    #[test]
    fn test_no_branch_is_unknown() {
        assert_eq!(ContainerState::from_status(&ReportedState::default()), ContainerState::Unknown);
    }

    #[test]
    fn test_observe_records_exit_code_only_when_terminated() {
        let pod = PodIdentity::new("ci", "uid-1", "p");

        let done = AwaitedContainer::observe(&pod, ContainerRole::App, &ContainerStatus::terminated("step", 3));
        assert_eq!(done.state, ContainerState::Terminated);
        assert_eq!(done.exit_code, Some(3));
        assert_eq!(done.namespace(), "ci");

        let running = AwaitedContainer::observe(&pod, ContainerRole::Init, &ContainerStatus::running("clone", true));
        assert_eq!(running.state, ContainerState::Running);
        assert!(running.ready);
        assert_eq!(running.exit_code, None);
    }
}
