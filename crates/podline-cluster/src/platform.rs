//! The cluster platform trait.

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::types::PodIdentity;
use crate::types::PodSpec;
use crate::types::PodStatusSnapshot;

/// Open byte stream of one container's output.
///
/// Follows the container until it exits; reads return end of stream once
/// the container is gone.
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// Container orchestration operations needed to run one pod per step.
///
/// Implementations must be safe to share between concurrently running steps.
#[async_trait]
pub trait ClusterPlatform: Send + Sync {
    /// Submit a pod.
    ///
    /// `Ok(None)` means the platform accepted the request without returning
    /// a pod; callers treat it as an empty identity.
    async fn create_pod(&self, spec: &PodSpec) -> Result<Option<PodIdentity>>;

    /// Fetch the current status of a pod.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodStatusSnapshot>;

    /// Open the followed output stream of one container.
    async fn stream_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<LogStream>;

    /// Delete a pod. Deleting a missing pod returns [`PodNotFound`](crate::ClusterError::PodNotFound).
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;
}
