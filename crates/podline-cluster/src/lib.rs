//! Cluster platform seam for pod-per-step execution.
//!
//! The engine never talks to a container orchestrator directly. It drives
//! the four operations of [`ClusterPlatform`]: create a pod, fetch its
//! status, open a container's log stream and delete the pod.
//!
//! # Backends
//!
//! - [`DeterministicCluster`]: scripted in-memory platform; every status fetch
//!   advances the pod one frame along a timeline written by the test.
//! - `KubeCluster` (feature `kubernetes`): Kubernetes through `kube`.
//!
//! # Status model
//!
//! ```text
//! PodStatusSnapshot
//!   ├── identity  (namespace, uid, name)
//!   ├── phase     (Pending | Running | Succeeded | Failed | Unknown)
//!   ├── init_container_statuses[]  ── ContainerStatus { ready, restarts, state }
//!   └── container_statuses[]       ── ContainerStatus { ready, restarts, state }
//! ```

mod deterministic;
pub mod error;
#[cfg(feature = "kubernetes")]
mod kubernetes;
mod platform;
mod types;

pub use deterministic::DeterministicCluster;
pub use deterministic::PodScript;
pub use error::ClusterError;
pub use error::Result;
#[cfg(feature = "kubernetes")]
pub use kubernetes::KubeCluster;
pub use platform::ClusterPlatform;
pub use platform::LogStream;
pub use types::ContainerSpec;
pub use types::ContainerStatus;
pub use types::PodIdentity;
pub use types::PodPhase;
pub use types::PodSpec;
pub use types::PodStatusSnapshot;
pub use types::ReportedState;
pub use types::RunningInfo;
pub use types::TerminatedInfo;
pub use types::WaitingInfo;
