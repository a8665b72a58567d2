//! Error types for the build engine.
//!
//! Errors fall into three groups by blast radius:
//!
//! - fatal to a step: pod creation, status fetch, waiter ceilings, container failures
//! - fatal to one container's log task: stream open and read failures, collected
//!   into [`EngineError::LogStreaming`] after the log barrier
//! - non-fatal: pod deletion, only ever logged

use podline_cluster::ClusterError;
use podline_cluster::PodPhase;
use snafu::Snafu;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Build engine errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    // ========================================================================
    // Pod lifecycle
    // ========================================================================
    /// The pod-spec builder rejected the step.
    #[snafu(display("failed to build pod spec for step '{step}': {reason}"))]
    BuildPodSpec {
        /// Step name.
        step: String,
        /// Builder failure, including its cause chain.
        reason: String,
    },

    /// Pod submission failed; there is no pod to clean up.
    #[snafu(display("failed to create pod {pod}: {source}"))]
    CreatePod {
        /// Pod as `namespace/name`.
        pod: String,
        /// Platform failure.
        source: ClusterError,
    },

    /// Fetching pod status failed while waiting on containers.
    #[snafu(display("failed to fetch status of pod {pod}: {source}"))]
    FetchPod {
        /// Pod as `namespace/name`.
        pod: String,
        /// Platform failure.
        source: ClusterError,
    },

    /// Deleting the pod failed.
    #[snafu(display("failed to delete pod {pod}: {source}"))]
    DeletePod {
        /// Pod as `namespace/name`.
        pod: String,
        /// Platform failure.
        source: ClusterError,
    },

    // ========================================================================
    // Waiter
    // ========================================================================
    /// Every tracked container already reached the expected status.
    #[snafu(display("nothing left to wait for in pod {pod}"))]
    NothingToWaitFor {
        /// Pod as `namespace/name`.
        pod: String,
    },

    /// The poll ceiling was hit before any container reached the expected status.
    #[snafu(display("pod {pod}: no container reached {policy} status after {polls} polls"))]
    PollLimitExceeded {
        /// Pod as `namespace/name`.
        pod: String,
        /// Expected-status policy name.
        policy: &'static str,
        /// Polls performed.
        polls: u32,
    },

    /// The pod reached a terminal phase with containers that can no longer
    /// reach the expected status.
    #[snafu(display("pod {pod} finished in phase {phase:?} with {pending} container(s) never {policy}"))]
    PodFinished {
        /// Pod as `namespace/name`.
        pod: String,
        /// Terminal phase observed.
        phase: PodPhase,
        /// Expected-status policy name.
        policy: &'static str,
        /// Containers still short of the expected status.
        pending: usize,
    },

    // ========================================================================
    // Log streaming
    // ========================================================================
    /// Opening a container's log stream failed.
    #[snafu(display("failed to open log stream of {pod}/{container}: {source}"))]
    OpenLogStream {
        /// Pod as `namespace/name`.
        pod: String,
        /// Container name.
        container: String,
        /// Platform failure.
        source: ClusterError,
    },

    /// A container's log stream failed mid-read.
    #[snafu(display("failed to read log stream of {pod}/{container} after {lines} line(s): {source}"))]
    ReadLogStream {
        /// Pod as `namespace/name`.
        pod: String,
        /// Container name.
        container: String,
        /// Lines forwarded before the failure.
        lines: u64,
        /// Stream failure.
        source: std::io::Error,
    },

    /// A log forwarding task panicked.
    #[snafu(display("log task for pod {pod} panicked: {reason}"))]
    LogTaskPanicked {
        /// Pod as `namespace/name`.
        pod: String,
        /// Join error description.
        reason: String,
    },

    /// One or more container log tasks failed.
    #[snafu(display("log streaming failed for {} task(s): {}", errors.len(), join_errors(errors)))]
    LogStreaming {
        /// Every collected failure, in completion order.
        errors: Vec<EngineError>,
    },

    // ========================================================================
    // Step outcome
    // ========================================================================
    /// A container exited with a non-zero code.
    #[snafu(display("container {pod}/{container} exited with code {exit_code}"))]
    ContainerFailed {
        /// Pod as `namespace/name`.
        pod: String,
        /// Container name.
        container: String,
        /// Exit code reported by the platform.
        exit_code: i32,
    },

    /// The platform reported the pod as failed without a failing container.
    #[snafu(display("pod {pod} failed"))]
    PodFailed {
        /// Pod as `namespace/name`.
        pod: String,
    },

    /// The step's task panicked.
    #[snafu(display("step '{step}' panicked: {reason}"))]
    StepPanicked {
        /// Step name.
        step: String,
        /// Join error description.
        reason: String,
    },

    /// The step was cancelled before it finished.
    #[snafu(display("step '{step}' was cancelled"))]
    Cancelled {
        /// Step name.
        step: String,
    },

    /// Engine configuration is out of bounds.
    #[snafu(display("invalid engine config: {reason}"))]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },
}

impl EngineError {
    /// Returns true for the cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

fn join_errors(errors: &[EngineError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
