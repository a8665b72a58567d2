//! Poll-driven container lifecycle waiter.
//!
//! A [`ContainerWaiter`] watches one pod and hands out its containers one at
//! a time as they reach the status described by an [`ExpectedStatus`]
//! policy. The orchestrator runs two of them per step: a [`ReadyPolicy`]
//! waiter to start log streaming and a [`DonePolicy`] waiter to confirm
//! completion.
//!
//! # Poll loop
//!
//! ```text
//! wait_next()
//!   └─ loop ──> get_pod ──> scan init containers, then app containers
//!        │          │            └─ first changed container that is expected ─> return
//!        │          └─ fetch error ─> return FetchPod (no retry)
//!        ├─ nothing left        ─> NothingToWaitFor
//!        ├─ pod phase terminal  ─> PodFinished
//!        ├─ poll budget spent   ─> PollLimitExceeded
//!        └─ sleep poll interval
//! ```
//!
//! # Tiger Style
//!
//! - Bounded polling: at most `max_polls` fetches per `wait_next` call
//! - The container cache is private to one waiter and keyed by container name

mod policy;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use podline_cluster::ClusterPlatform;
use podline_cluster::PodPhase;
use podline_cluster::PodStatusSnapshot;
use podline_constants::MAX_WAITER_POLLS;
use podline_constants::WAITER_POLL_INTERVAL_MS;
pub use policy::DonePolicy;
pub use policy::ExpectedStatus;
pub use policy::ReadyPolicy;
use tracing::Span;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::container::AwaitedContainer;
use crate::container::ContainerRole;
use crate::error::EngineError;
use crate::error::Result;
use crate::verified::is_poll_limit_reached;

/// Waits for the containers of one pod to reach an expected status.
pub struct ContainerWaiter<P> {
    platform: Arc<dyn ClusterPlatform>,
    namespace: String,
    pod_name: String,
    policy: P,
    /// Last observation per container name.
    containers: HashMap<String, AwaitedContainer>,
    /// Container names of the latest snapshot, init containers first.
    tracked: Vec<String>,
    /// Set once a snapshot listing at least one container was seen.
    fetched: bool,
    last_phase: PodPhase,
    poll_interval: Duration,
    max_polls: u32,
    span: Span,
}

impl<P: ExpectedStatus> ContainerWaiter<P> {
    /// Create a waiter for pod `namespace/pod_name`.
    ///
    /// Events are emitted under `span`.
    pub fn new(
        platform: Arc<dyn ClusterPlatform>,
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        policy: P,
        span: Span,
    ) -> Self {
        Self {
            platform,
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            policy,
            containers: HashMap::new(),
            tracked: Vec::new(),
            fetched: false,
            last_phase: PodPhase::Unknown,
            poll_interval: Duration::from_millis(WAITER_POLL_INTERVAL_MS),
            max_polls: MAX_WAITER_POLLS,
            span,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Cap the fetches of a single [`wait_next`](Self::wait_next) call. Clamped to at least 1.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    /// True until every tracked container has reached the expected status.
    ///
    /// Always true before the first snapshot that lists containers, since a
    /// pod that is still being scheduled reports none. Uses cached state only.
    pub fn any_remaining(&self) -> bool {
        if !self.fetched {
            return true;
        }
        self.tracked.iter().any(|name| match self.containers.get(name) {
            Some(container) => !self.policy.is_expected(container),
            None => true,
        })
    }

    /// Block until the next container reaches the expected status.
    ///
    /// Returns at most one container per call. Init containers are scanned
    /// before app containers within each fetch, so an init container is
    /// always offered first when both qualify in the same fetch. A container
    /// is returned again only after its observed status changed and then
    /// satisfied the policy once more.
    pub async fn wait_next(&mut self) -> Result<AwaitedContainer> {
        if !self.any_remaining() {
            return Err(self.nothing_to_wait_for());
        }

        let mut polls: u32 = 0;
        loop {
            let snapshot = match self.platform.get_pod(&self.namespace, &self.pod_name).await {
                Ok(snapshot) => snapshot,
                Err(source) => {
                    warn!(
                        parent: &self.span,
                        pod = %self.pod(),
                        policy = self.policy.name(),
                        error = %source,
                        "pod status fetch failed"
                    );
                    return Err(EngineError::FetchPod { pod: self.pod(), source });
                }
            };
            polls = polls.saturating_add(1);

            if let Some(container) = self.scan(&snapshot) {
                debug!(
                    parent: &self.span,
                    pod = %self.pod(),
                    container = %container.name,
                    role = ?container.role,
                    state = %container.state,
                    policy = self.policy.name(),
                    "container reached expected status"
                );
                return Ok(container);
            }

            if !self.any_remaining() {
                return Err(self.nothing_to_wait_for());
            }

            if snapshot.phase.is_terminal() {
                let pending = self.pending().len();
                debug!(
                    parent: &self.span,
                    pod = %self.pod(),
                    phase = ?snapshot.phase,
                    pending,
                    policy = self.policy.name(),
                    "pod finished before all containers reached expected status"
                );
                return Err(EngineError::PodFinished {
                    pod: self.pod(),
                    phase: snapshot.phase,
                    policy: self.policy.name(),
                    pending,
                });
            }

            if is_poll_limit_reached(polls, self.max_polls) {
                warn!(
                    parent: &self.span,
                    pod = %self.pod(),
                    polls,
                    policy = self.policy.name(),
                    "container wait exceeded poll limit"
                );
                return Err(EngineError::PollLimitExceeded {
                    pod: self.pod(),
                    policy: self.policy.name(),
                    polls,
                });
            }

            trace!(parent: &self.span, pod = %self.pod(), polls, "no container changed, polling again");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Tracked containers that have not reached the expected status, in scan order.
    pub fn pending(&self) -> Vec<AwaitedContainer> {
        self.tracked
            .iter()
            .filter_map(|name| self.containers.get(name))
            .filter(|container| !self.policy.is_expected(container))
            .cloned()
            .collect()
    }

    /// Pod phase reported by the latest snapshot.
    pub fn last_phase(&self) -> PodPhase {
        self.last_phase
    }

    /// Apply one snapshot to the cache; return the first container that
    /// changed into the expected status.
    fn scan(&mut self, snapshot: &PodStatusSnapshot) -> Option<AwaitedContainer> {
        self.last_phase = snapshot.phase;

        let statuses = snapshot
            .init_container_statuses
            .iter()
            .map(|status| (ContainerRole::Init, status))
            .chain(snapshot.container_statuses.iter().map(|status| (ContainerRole::App, status)));

        self.tracked = statuses.clone().map(|(_, status)| status.name.clone()).collect();
        if !self.tracked.is_empty() {
            self.fetched = true;
        }

        for (role, status) in statuses {
            let observed = AwaitedContainer::observe(&snapshot.identity, role, status);
            let changed = match self.containers.get(&observed.name) {
                Some(previous) => self.policy.has_changed(previous, &observed),
                None => true,
            };
            // latest observation, even when the policy saw no change
            self.containers.insert(observed.name.clone(), observed.clone());
            if !changed {
                continue;
            }

            trace!(
                parent: &self.span,
                pod = %self.pod(),
                container = %observed.name,
                state = %observed.state,
                ready = observed.ready,
                "container status changed"
            );
            if self.policy.is_expected(&observed) {
                return Some(observed);
            }
        }
        None
    }

    fn pod(&self) -> String {
        format!("{}/{}", self.namespace, self.pod_name)
    }

    fn nothing_to_wait_for(&self) -> EngineError {
        EngineError::NothingToWaitFor { pod: self.pod() }
    }
}

#[cfg(test)]
mod tests {
    use podline_cluster::ContainerSpec;
    use podline_cluster::ContainerStatus;
    use podline_cluster::DeterministicCluster;
    use podline_cluster::PodScript;
    use podline_cluster::PodSpec;

    use super::*;
    use crate::container::ContainerState;

    async fn cluster_with(script: PodScript) -> Arc<DeterministicCluster> {
        let cluster = DeterministicCluster::new();
        cluster.script_pod("p", script);
        let spec = PodSpec {
            name: "p".to_string(),
            namespace: "ci".to_string(),
            containers: vec![ContainerSpec::new("step", "rust:1")],
            ..PodSpec::default()
        };
        cluster.create_pod(&spec).await.unwrap();
        cluster
    }

    fn waiter<P: ExpectedStatus>(cluster: &Arc<DeterministicCluster>, policy: P) -> ContainerWaiter<P> {
        ContainerWaiter::new(cluster.clone(), "ci", "p", policy, Span::none())
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_remaining_before_first_fetch() {
        let cluster = cluster_with(PodScript::new()).await;
        let waiter = waiter(&cluster, ReadyPolicy);
        assert!(waiter.any_remaining());
        assert_eq!(cluster.fetch_count("p"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_containers_offered_before_app() {
        // both qualify in the same snapshot
        let cluster = cluster_with(PodScript::new().frame(
            PodPhase::Running,
            vec![ContainerStatus::terminated("clone", 0)],
            vec![ContainerStatus::terminated("step", 0)],
        ))
        .await;
        let mut waiter = waiter(&cluster, DonePolicy);

        let first = waiter.wait_next().await.unwrap();
        assert_eq!(first.name, "clone");
        assert_eq!(first.role, ContainerRole::Init);
        assert!(waiter.any_remaining());

        let second = waiter.wait_next().await.unwrap();
        assert_eq!(second.name, "step");
        assert_eq!(second.role, ContainerRole::App);
        assert!(!waiter.any_remaining());

        let err = waiter.wait_next().await.unwrap_err();
        assert!(matches!(err, EngineError::NothingToWaitFor { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_container_changes() {
        let cluster = cluster_with(
            PodScript::new()
                .frame(PodPhase::Pending, vec![], vec![ContainerStatus::waiting("step", "ContainerCreating")])
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", false)])
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)]),
        )
        .await;
        let mut waiter = waiter(&cluster, ReadyPolicy);

        let start = tokio::time::Instant::now();
        let ready = waiter.wait_next().await.unwrap();
        assert_eq!(ready.name, "step");
        assert_eq!(ready.state, ContainerState::Running);
        assert_eq!(cluster.fetch_count("p"), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(2 * WAITER_POLL_INTERVAL_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_without_containers_is_not_a_fetch() {
        let cluster = cluster_with(
            PodScript::new()
                .frame(PodPhase::Pending, vec![], vec![])
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)]),
        )
        .await;
        let mut waiter = waiter(&cluster, ReadyPolicy);

        assert_eq!(waiter.wait_next().await.unwrap().name, "step");
        assert!(!waiter.any_remaining());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_container_not_returned_twice() {
        let cluster = cluster_with(
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![
                    ContainerStatus::running("a", true),
                    ContainerStatus::running("b", false),
                ])
                .frame(PodPhase::Running, vec![], vec![
                    ContainerStatus::running("a", true),
                    ContainerStatus::running("b", true),
                ]),
        )
        .await;
        let mut waiter = waiter(&cluster, ReadyPolicy);

        assert_eq!(waiter.wait_next().await.unwrap().name, "a");
        assert_eq!(waiter.wait_next().await.unwrap().name, "b");
        assert!(!waiter.any_remaining());
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_returned_again_after_change() {
        let cluster = cluster_with(
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![
                    ContainerStatus::running("a", true),
                    ContainerStatus::running("b", false),
                ])
                .frame(PodPhase::Running, vec![], vec![
                    ContainerStatus::running("a", false),
                    ContainerStatus::running("b", false),
                ])
                .frame(PodPhase::Running, vec![], vec![
                    ContainerStatus::running("a", true).with_restarts(1),
                    ContainerStatus::running("b", false),
                ]),
        )
        .await;
        let mut waiter = waiter(&cluster, ReadyPolicy);

        let first = waiter.wait_next().await.unwrap();
        assert_eq!((first.name.as_str(), first.restart_count), ("a", 0));

        let again = waiter.wait_next().await.unwrap();
        assert_eq!((again.name.as_str(), again.restart_count), ("a", 1));
        assert_eq!(waiter.pending().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_is_returned_without_retry() {
        let cluster = cluster_with(
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", false)])
                .fail_fetch_at(1),
        )
        .await;
        let mut waiter = waiter(&cluster, ReadyPolicy);

        let err = waiter.wait_next().await.unwrap_err();
        assert!(matches!(err, EngineError::FetchPod { .. }), "unexpected error: {err}");
        assert_eq!(cluster.fetch_count("p"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_pod_ends_the_wait() {
        let cluster = cluster_with(
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", false)])
                .frame(PodPhase::Succeeded, vec![], vec![ContainerStatus::terminated("step", 0)]),
        )
        .await;
        let mut waiter = waiter(&cluster, ReadyPolicy);

        let err = waiter.wait_next().await.unwrap_err();
        match err {
            EngineError::PodFinished { phase, pending, .. } => {
                assert_eq!(phase, PodPhase::Succeeded);
                assert_eq!(pending, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(waiter.last_phase(), PodPhase::Succeeded);
        assert_eq!(waiter.pending()[0].name, "step");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_reports_latest_state() {
        // ready never flips, so the policy sees no change, but the state does
        let cluster = cluster_with(
            PodScript::new()
                .frame(PodPhase::Pending, vec![], vec![ContainerStatus::waiting("step", "ContainerCreating")])
                .frame(PodPhase::Succeeded, vec![], vec![ContainerStatus::terminated("step", 0)]),
        )
        .await;
        let mut waiter = waiter(&cluster, ReadyPolicy);

        let err = waiter.wait_next().await.unwrap_err();
        assert!(matches!(err, EngineError::PodFinished { .. }), "unexpected error: {err}");
        let pending = waiter.pending();
        assert_eq!(pending[0].state, ContainerState::Terminated);
        assert_eq!(pending[0].exit_code, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_limit() {
        let script = PodScript::new().frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", false)]);
        let cluster = cluster_with(script).await;
        let mut waiter = waiter(&cluster, ReadyPolicy).with_max_polls(5);

        let err = waiter.wait_next().await.unwrap_err();
        assert!(matches!(err, EngineError::PollLimitExceeded { polls: 5, .. }), "unexpected error: {err}");
        assert_eq!(cluster.fetch_count("p"), 5);
    }
}
