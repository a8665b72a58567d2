//! Runs one step as one pod.
//!
//! # Step lifecycle
//!
//! ```text
//! build pod request ──> create pod
//!                          │
//!            ┌─────────────┴──────────────┐
//!            │ ReadyPolicy waiter          │  one log task per ready container
//!            │   ready notice + log task ──┼──> LineScanner ──> log channel
//!            │ barrier: join every task    │
//!            ├─────────────────────────────┤
//!            │ DonePolicy waiter           │  every container terminated
//!            ├─────────────────────────────┤
//!            │ exit code check             │
//!            └─────────────┬──────────────┘
//!                          │  (cancellation short-circuits the box)
//!                     delete pod (failure only logged)
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use podline_cluster::ClusterPlatform;
use podline_cluster::PodIdentity;
use podline_cluster::PodPhase;
use podline_cluster::PodSpec;
use podline_logscan::LineScanner;
use podline_logscan::SanitizeOptions;
use serde::Deserialize;
use serde::Serialize;
use snafu::ResultExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing::Span;
use tracing::debug;
use tracing::debug_span;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::builder::PodSpecBuilder;
use crate::config::EngineConfig;
use crate::container::AwaitedContainer;
use crate::container::ContainerState;
use crate::definition::StageDefinition;
use crate::definition::StepDefinition;
use crate::error::CreatePodSnafu;
use crate::error::DeletePodSnafu;
use crate::error::EngineError;
use crate::error::OpenLogStreamSnafu;
use crate::error::Result;
use crate::verified::first_failed_container;
use crate::waiter::ContainerWaiter;
use crate::waiter::DonePolicy;
use crate::waiter::ExpectedStatus;
use crate::waiter::ReadyPolicy;

/// Kind of a [`StepLogLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLineKind {
    /// Synthetic notice emitted when a container is first seen ready.
    ContainerReady,
    /// One sanitized line of container output.
    Output,
}

/// One line on a step's output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLogLine {
    pub step: String,
    pub container: String,
    pub kind: LogLineKind,
    pub content: String,
}

impl StepLogLine {
    pub fn container_ready(step: &str, container: &str) -> Self {
        Self {
            step: step.to_string(),
            container: container.to_string(),
            kind: LogLineKind::ContainerReady,
            content: format!("container '{container}' is ready"),
        }
    }

    pub fn output(step: &str, container: &str, content: impl Into<String>) -> Self {
        Self {
            step: step.to_string(),
            container: container.to_string(),
            kind: LogLineKind::Output,
            content: content.into(),
        }
    }
}

/// Final observation of a pod.
#[derive(Debug, Clone)]
pub struct FinishedPod {
    pub phase: PodPhase,
    /// Terminated containers, init containers first.
    pub containers: Vec<AwaitedContainer>,
    /// Containers that never terminated because the pod reached a terminal
    /// phase first, e.g. app containers behind a failed init container.
    pub unfinished: Vec<AwaitedContainer>,
}

/// Runs exactly one step as exactly one pod.
pub struct PodOrchestrator {
    platform: Arc<dyn ClusterPlatform>,
    builder: Arc<dyn PodSpecBuilder>,
    config: EngineConfig,
    span: Span,
}

impl PodOrchestrator {
    /// Create an orchestrator. Every step span is a child of `span`.
    pub fn new(
        platform: Arc<dyn ClusterPlatform>,
        builder: Arc<dyn PodSpecBuilder>,
        config: EngineConfig,
        span: Span,
    ) -> Self {
        Self {
            platform,
            builder,
            config,
            span,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `step` end to end and delete its pod.
    ///
    /// `logs` receives ready notices and output lines; this run's senders
    /// are all dropped by the time it returns. Once the pod exists it is
    /// deleted whatever the outcome, including cancellation through `cancel`.
    pub async fn run(
        &self,
        step: &StepDefinition,
        stage: &StageDefinition,
        build_id: u64,
        logs: mpsc::Sender<StepLogLine>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled { step: step.name.clone() });
        }

        let spec = self.builder.build_pod_request(step, stage, build_id).map_err(|e| EngineError::BuildPodSpec {
            step: step.name.clone(),
            reason: format!("{e:#}"),
        })?;

        let span = info_span!(
            parent: &self.span,
            "step",
            stage = %stage.name,
            step = %step.name,
            build_id,
            pod = %spec.name
        );
        self.create_pod(&spec, &span).await?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(parent: &span, "step cancelled");
                Err(EngineError::Cancelled { step: step.name.clone() })
            }
            result = self.execute(&step.name, &spec, logs, &span) => result,
        };

        match self.delete_pod(&spec).await {
            Ok(()) => debug!(parent: &span, "pod deleted"),
            Err(e) => warn!(parent: &span, error = %e, "failed to delete pod"),
        }

        match &outcome {
            Ok(()) => info!(parent: &span, "step succeeded"),
            Err(e) => debug!(parent: &span, error = %e, "step ended with error"),
        }
        outcome
    }

    /// Submit the pod for `spec`.
    ///
    /// A platform that accepts the pod without returning it yields an empty
    /// [`PodIdentity`]; the run continues by name.
    pub async fn create_pod(&self, spec: &PodSpec, span: &Span) -> Result<PodIdentity> {
        let created = self.platform.create_pod(spec).await.context(CreatePodSnafu {
            pod: format!("{}/{}", spec.namespace, spec.name),
        })?;

        match created {
            Some(identity) => {
                info!(parent: span, pod = %identity, uid = %identity.uid, "pod created");
                Ok(identity)
            }
            None => {
                warn!(parent: span, pod = %spec.name, "platform returned no pod, continuing with an empty identity");
                Ok(PodIdentity::default())
            }
        }
    }

    /// Stream the logs of every container of the pod until all were seen ready.
    ///
    /// Each ready container gets a ready notice on `logs` and its own log
    /// task. Returns after every task has finished; task failures are
    /// joined into [`EngineError::LogStreaming`]. A pod that finishes before
    /// some containers were seen ready still has those containers' logs
    /// streamed, without a ready notice.
    pub async fn stream_logs(
        &self,
        step: &str,
        spec: &PodSpec,
        logs: mpsc::Sender<StepLogLine>,
        span: &Span,
    ) -> Result<()> {
        let mut waiter = self.waiter(spec, ReadyPolicy, span);
        let mut fanout = LogFanout::new(self, step, spec, logs, span);
        let mut streamed: HashSet<String> = HashSet::new();
        let mut fatal = None;

        while waiter.any_remaining() {
            match waiter.wait_next().await {
                Ok(container) => {
                    fanout.announce(&container.name).await;
                    streamed.insert(container.name.clone());
                    fanout.spawn(&container.name);
                }
                Err(EngineError::PodFinished { .. }) => {
                    // containers that never started have no logs to open
                    let started = waiter
                        .pending()
                        .into_iter()
                        .filter(|c| !matches!(c.state, ContainerState::Waiting | ContainerState::Unknown));
                    for container in started {
                        if streamed.insert(container.name.clone()) {
                            debug!(
                                parent: span,
                                container = %container.name,
                                "container finished before it was seen ready, capturing its logs"
                            );
                            fanout.spawn(&container.name);
                        }
                    }
                    break;
                }
                Err(EngineError::NothingToWaitFor { .. }) => break,
                Err(e) => {
                    fatal = Some(e);
                    break;
                }
            }
        }

        let errors = fanout.finish().await;
        if let Some(e) = fatal {
            if !errors.is_empty() {
                warn!(parent: span, failed_tasks = errors.len(), "log tasks also failed");
            }
            return Err(e);
        }
        if errors.is_empty() { Ok(()) } else { Err(EngineError::LogStreaming { errors }) }
    }

    /// Block until every container of the pod has terminated, or the pod
    /// reached a terminal phase.
    ///
    /// In the second case the containers that never terminated are listed in
    /// [`FinishedPod::unfinished`].
    pub async fn wait_until_finished(&self, spec: &PodSpec, span: &Span) -> Result<FinishedPod> {
        let mut waiter = self.waiter(spec, DonePolicy, span);
        let mut containers: Vec<AwaitedContainer> = Vec::new();
        let mut unfinished = Vec::new();

        while waiter.any_remaining() {
            match waiter.wait_next().await {
                Ok(container) => {
                    debug!(
                        parent: span,
                        container = %container.name,
                        exit_code = ?container.exit_code,
                        "container terminated"
                    );
                    match containers.iter_mut().find(|c| c.name == container.name) {
                        Some(slot) => *slot = container,
                        None => containers.push(container),
                    }
                }
                Err(EngineError::NothingToWaitFor { .. }) => break,
                Err(EngineError::PodFinished { phase, pending, .. }) => {
                    debug!(parent: span, ?phase, pending, "pod finished with containers still pending");
                    unfinished = waiter.pending();
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(FinishedPod {
            phase: waiter.last_phase(),
            containers,
            unfinished,
        })
    }

    /// Delete the pod for `spec`.
    pub async fn delete_pod(&self, spec: &PodSpec) -> Result<()> {
        self.platform.delete_pod(&spec.namespace, &spec.name).await.context(DeletePodSnafu {
            pod: format!("{}/{}", spec.namespace, spec.name),
        })
    }

    async fn execute(&self, step: &str, spec: &PodSpec, logs: mpsc::Sender<StepLogLine>, span: &Span) -> Result<()> {
        self.stream_logs(step, spec, logs, span).await?;
        let finished = self.wait_until_finished(spec, span).await?;
        if self.config.check_exit_codes {
            check_exit_codes(spec, &finished)?;
        }
        if !finished.unfinished.is_empty() {
            return Err(EngineError::PodFinished {
                pod: format!("{}/{}", spec.namespace, spec.name),
                phase: finished.phase,
                policy: DonePolicy.name(),
                pending: finished.unfinished.len(),
            });
        }
        Ok(())
    }

    fn waiter<P: ExpectedStatus>(&self, spec: &PodSpec, policy: P, span: &Span) -> ContainerWaiter<P> {
        ContainerWaiter::new(Arc::clone(&self.platform), &spec.namespace, &spec.name, policy, span.clone())
            .with_poll_interval(self.config.poll_interval())
            .with_max_polls(self.config.max_polls)
    }
}

fn check_exit_codes(spec: &PodSpec, finished: &FinishedPod) -> Result<()> {
    let pod = format!("{}/{}", spec.namespace, spec.name);
    if let Some(container) = first_failed_container(&finished.containers) {
        return Err(EngineError::ContainerFailed {
            pod,
            container: container.name.clone(),
            exit_code: container.exit_code.unwrap_or_default(),
        });
    }
    if finished.phase == PodPhase::Failed {
        return Err(EngineError::PodFailed { pod });
    }
    Ok(())
}

/// Per-run set of container log tasks sharing one output channel.
struct LogFanout {
    platform: Arc<dyn ClusterPlatform>,
    namespace: String,
    pod: String,
    step: String,
    options: SanitizeOptions,
    logs: mpsc::Sender<StepLogLine>,
    failures: Arc<Mutex<Vec<EngineError>>>,
    tasks: JoinSet<()>,
    span: Span,
}

impl LogFanout {
    fn new(
        orchestrator: &PodOrchestrator,
        step: &str,
        spec: &PodSpec,
        logs: mpsc::Sender<StepLogLine>,
        span: &Span,
    ) -> Self {
        Self {
            platform: Arc::clone(&orchestrator.platform),
            namespace: spec.namespace.clone(),
            pod: spec.name.clone(),
            step: step.to_string(),
            options: orchestrator.config.sanitize,
            logs,
            failures: Arc::new(Mutex::new(Vec::new())),
            tasks: JoinSet::new(),
            span: span.clone(),
        }
    }

    async fn announce(&mut self, container: &str) {
        if self.logs.send(StepLogLine::container_ready(&self.step, container)).await.is_err() {
            debug!(parent: &self.span, container, "log receiver dropped, ready notice discarded");
        }
    }

    fn spawn(&mut self, container: &str) {
        let span = debug_span!(parent: &self.span, "container_logs", container);
        let task = ContainerLogTask {
            platform: Arc::clone(&self.platform),
            namespace: self.namespace.clone(),
            pod: self.pod.clone(),
            container: container.to_string(),
            step: self.step.clone(),
            options: self.options,
            logs: self.logs.clone(),
            span: span.clone(),
        };
        let failures = Arc::clone(&self.failures);

        self.tasks.spawn(
            async move {
                if let Err(e) = task.run().await {
                    warn!(error = %e, "container log task failed");
                    failures.lock().push(e);
                }
            }
            .instrument(span),
        );
    }

    /// Drop this run's sender and wait for every task; return the collected failures.
    async fn finish(self) -> Vec<EngineError> {
        let Self {
            namespace,
            pod,
            logs,
            failures,
            mut tasks,
            span,
            ..
        } = self;
        drop(logs);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(parent: &span, error = %e, "container log task panicked");
                failures.lock().push(EngineError::LogTaskPanicked {
                    pod: format!("{namespace}/{pod}"),
                    reason: e.to_string(),
                });
            }
        }
        debug!(parent: &span, "all container log tasks finished");

        std::mem::take(&mut *failures.lock())
    }
}

/// Forwards one container's sanitized output to the log channel.
struct ContainerLogTask {
    platform: Arc<dyn ClusterPlatform>,
    namespace: String,
    pod: String,
    container: String,
    step: String,
    options: SanitizeOptions,
    logs: mpsc::Sender<StepLogLine>,
    span: Span,
}

impl ContainerLogTask {
    async fn run(self) -> Result<()> {
        let pod = format!("{}/{}", self.namespace, self.pod);
        let stream = self.platform.stream_logs(&self.namespace, &self.pod, &self.container).await.context(
            OpenLogStreamSnafu {
                pod: pod.clone(),
                container: self.container.clone(),
            },
        )?;

        let mut scanner = LineScanner::new(BufReader::new(stream), self.options, self.span.clone());
        while scanner.advance().await {
            let line = StepLogLine::output(&self.step, &self.container, scanner.line());
            if self.logs.send(line).await.is_err() {
                debug!(parent: &self.span, "log receiver dropped, stopping forwarding");
                return Ok(());
            }
        }

        let lines = scanner.lines_read();
        match scanner.into_error() {
            Some(source) => Err(EngineError::ReadLogStream {
                pod,
                container: self.container,
                lines,
                source,
            }),
            None => {
                debug!(parent: &self.span, lines, "container log stream ended");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use podline_cluster::ContainerStatus;
    use podline_cluster::DeterministicCluster;
    use podline_cluster::PodScript;

    use super::*;
    use crate::builder::StepPodSpecBuilder;
    use crate::verified::pod_name;

    fn pod() -> String {
        pod_name("build", "compile", 1)
    }

    fn orchestrator(cluster: &Arc<DeterministicCluster>, config: EngineConfig) -> PodOrchestrator {
        PodOrchestrator::new(cluster.clone(), Arc::new(StepPodSpecBuilder::new("ci")), config, Span::none())
    }

    fn stage() -> StageDefinition {
        StageDefinition::new("build", vec![StepDefinition::new("compile", "rust:1")])
    }

    async fn run(orchestrator: &PodOrchestrator, cancel: &CancellationToken) -> (Result<()>, Vec<StepLogLine>) {
        let stage = stage();
        let (tx, mut rx) = mpsc::channel(1000);
        let result = orchestrator.run(&stage.steps[0], &stage, 1, tx, cancel).await;

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        (result, lines)
    }

    fn output(lines: &[StepLogLine], container: &str) -> Vec<String> {
        lines
            .iter()
            .filter(|l| l.kind == LogLineKind::Output && l.container == container)
            .map(|l| l.content.clone())
            .collect()
    }

    fn ready_notices(lines: &[StepLogLine]) -> Vec<&str> {
        lines.iter().filter(|l| l.kind == LogLineKind::ContainerReady).map(|l| l.container.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_sanitized_logs_and_deletes_pod() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)])
                .frame(PodPhase::Succeeded, vec![], vec![ContainerStatus::terminated("step", 0)])
                .logs("step", "Compiling 10%\rCompiling 100%\n\x1b[32mFinished\x1b[0m\n"),
        );

        let (result, lines) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        result.unwrap();

        assert_eq!(ready_notices(&lines), ["step"]);
        assert_eq!(lines[0].kind, LogLineKind::ContainerReady);
        assert_eq!(output(&lines, "step"), ["Compiling 100%", "Finished"]);
        assert_eq!(cluster.deleted_pods().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_needs_no_cleanup() {
        let cluster = DeterministicCluster::new();
        cluster.fail_create(&pod());

        let (result, lines) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::CreatePod { .. })));
        assert!(lines.is_empty());
        assert!(cluster.deleted_pods().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_builder_failure_creates_nothing() {
        let cluster = DeterministicCluster::new();
        let orchestrator = orchestrator(&cluster, EngineConfig::default());
        let stage = StageDefinition::new("build", vec![StepDefinition::new("compile", "")]);
        let (tx, _rx) = mpsc::channel(16);

        let err = orchestrator.run(&stage.steps[0], &stage, 1, tx, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::BuildPodSpec { .. }));
        assert!(cluster.created_pods().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_open_failure_is_joined_and_siblings_continue() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![
                    ContainerStatus::running("a", true),
                    ContainerStatus::running("b", true),
                ])
                .frame(PodPhase::Succeeded, vec![], vec![
                    ContainerStatus::terminated("a", 0),
                    ContainerStatus::terminated("b", 0),
                ])
                .logs("a", "from a\n")
                .fail_log_open("b"),
        );

        let (result, lines) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        match result {
            Err(EngineError::LogStreaming { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(&errors[0], EngineError::OpenLogStream { container, .. } if container == "b"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(output(&lines, "a"), ["from a"]);
        assert_eq!(cluster.deleted_pods().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_read_failure_keeps_lines_before_it() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)])
                .logs("step", "one\ntwo\n")
                .fail_log_read("step"),
        );

        let (result, lines) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        match result {
            Err(EngineError::LogStreaming { errors }) => {
                assert!(matches!(&errors[0], EngineError::ReadLogStream { lines: 2, .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(output(&lines, "step"), ["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_container_finished_before_ready_still_streamed() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", false)])
                .frame(PodPhase::Succeeded, vec![], vec![ContainerStatus::terminated("step", 0)])
                .logs("step", "quick\n"),
        );

        let (result, lines) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        result.unwrap();
        assert!(ready_notices(&lines).is_empty());
        assert_eq!(output(&lines, "step"), ["quick"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_zero_exit_fails_step() {
        let script = || {
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)])
                .frame(PodPhase::Failed, vec![], vec![ContainerStatus::terminated("step", 2)])
        };

        let cluster = DeterministicCluster::new();
        cluster.script_pod(&pod(), script());
        let (result, _) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::ContainerFailed { exit_code: 2, .. })));
        assert_eq!(cluster.deleted_pods().len(), 1);

        let cluster = DeterministicCluster::new();
        cluster.script_pod(&pod(), script());
        let config = EngineConfig {
            check_exit_codes: false,
            ..EngineConfig::default()
        };
        let (result, _) = run(&orchestrator(&cluster, config), &CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_phase_without_failed_container() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)])
                .frame(PodPhase::Failed, vec![], vec![ContainerStatus::terminated("step", 0)]),
        );

        let (result, _) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::PodFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_init_container_reports_its_exit_code() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new()
                .frame(PodPhase::Pending, vec![ContainerStatus::running("clone", false)], vec![
                    ContainerStatus::waiting("step", "PodInitializing"),
                ])
                .frame(PodPhase::Failed, vec![ContainerStatus::terminated("clone", 128)], vec![
                    ContainerStatus::waiting("step", "PodInitializing"),
                ])
                .logs("clone", "fatal: repository not found\n")
                // the app container never started; opening its logs would fail
                .fail_log_open("step"),
        );

        let (result, lines) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        match result {
            Err(EngineError::ContainerFailed { container, exit_code, .. }) => {
                assert_eq!(container, "clone");
                assert_eq!(exit_code, 128);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(output(&lines, "clone"), ["fatal: repository not found"]);
        assert_eq!(cluster.deleted_pods().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unfinished_containers_fail_step_without_exit_code_check() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new().frame(PodPhase::Failed, vec![ContainerStatus::terminated("clone", 0)], vec![
                ContainerStatus::waiting("step", "PodInitializing"),
            ]),
        );
        let config = EngineConfig {
            check_exit_codes: false,
            ..EngineConfig::default()
        };

        let (result, _) = run(&orchestrator(&cluster, config), &CancellationToken::new()).await;
        assert!(
            matches!(result, Err(EngineError::PodFinished { phase: PodPhase::Failed, pending: 1, .. })),
            "unexpected result: {result:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_failure_does_not_change_outcome() {
        let cluster = DeterministicCluster::new();
        cluster.fail_delete(&pod());

        let (result, _) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        assert!(result.is_ok());
        assert!(cluster.deleted_pods().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_is_fatal() {
        let cluster = DeterministicCluster::new();
        cluster.script_pod(
            &pod(),
            PodScript::new()
                .frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)])
                .fail_fetch_at(1),
        );

        let (result, _) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::FetchPod { .. })));
        assert_eq!(cluster.deleted_pods().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pod_handle_is_tolerated() {
        let cluster = DeterministicCluster::new();
        cluster.omit_created_pod(&pod());

        let (result, _) = run(&orchestrator(&cluster, EngineConfig::default()), &CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_still_deletes_pod() {
        let cluster = DeterministicCluster::new();
        // never terminates
        cluster.script_pod(
            &pod(),
            PodScript::new().frame(PodPhase::Running, vec![], vec![ContainerStatus::running("step", true)]),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let (result, _) = run(&orchestrator(&cluster, EngineConfig::default()), &cancel).await;
        assert!(matches!(result, Err(EngineError::Cancelled { .. })));
        assert_eq!(cluster.deleted_pods().len(), 1);
        assert!(cluster.fetch_count(&pod()) > 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_creates_nothing() {
        let cluster = DeterministicCluster::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (result, _) = run(&orchestrator(&cluster, EngineConfig::default()), &cancel).await;
        assert!(result.unwrap_err().is_cancelled());
        assert!(cluster.created_pods().is_empty());
    }
}
