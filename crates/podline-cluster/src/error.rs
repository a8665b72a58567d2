//! Error types for cluster platform operations.

use snafu::Snafu;

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Failures reported by a [`ClusterPlatform`](crate::ClusterPlatform).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClusterError {
    /// The pod does not exist (never created, or already deleted).
    #[snafu(display("pod {namespace}/{name} not found"))]
    PodNotFound {
        /// Pod namespace.
        namespace: String,
        /// Pod name.
        name: String,
    },

    /// A pod with the same name already exists.
    #[snafu(display("pod {namespace}/{name} already exists"))]
    PodAlreadyExists {
        /// Pod namespace.
        namespace: String,
        /// Pod name.
        name: String,
    },

    /// The pod specification was rejected before submission.
    #[snafu(display("invalid pod spec '{name}': {reason}"))]
    InvalidPodSpec {
        /// Pod name from the spec.
        name: String,
        /// Why the spec is invalid.
        reason: String,
    },

    /// The platform API call failed.
    #[snafu(display("cluster {operation} failed for {target}: {reason}"))]
    Api {
        /// Operation that failed ("create", "get", "logs", "delete").
        operation: String,
        /// Object the operation addressed.
        target: String,
        /// Failure reason reported by the platform.
        reason: String,
    },
}

impl ClusterError {
    /// Returns true if the pod is missing on the platform.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PodNotFound { .. })
    }
}
