//! Pod-per-step build engine.
//!
//! Runs the steps of a CI stage concurrently, each as one short-lived pod:
//!
//! ```text
//! StepScheduler ──(one task per step)──> PodOrchestrator
//!                                           ├── ContainerWaiter<ReadyPolicy> ──> log tasks (LineScanner)
//!                                           └── ContainerWaiter<DonePolicy>
//! ```
//!
//! The cluster is reached only through [`ClusterPlatform`](podline_cluster::ClusterPlatform),
//! and steps are turned into pods by a [`PodSpecBuilder`]. Logging is
//! injected: every component takes a [`tracing::Span`] and emits its events
//! under it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use podline_cluster::DeterministicCluster;
//! use podline_engine::EngineConfig;
//! use podline_engine::PodOrchestrator;
//! use podline_engine::StageDefinition;
//! use podline_engine::StepDefinition;
//! use podline_engine::StepPodSpecBuilder;
//! use podline_engine::StepScheduler;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let config = EngineConfig::default();
//! let (logs, mut rx) = config.log_channel();
//! let orchestrator = PodOrchestrator::new(
//!     DeterministicCluster::new(),
//!     Arc::new(StepPodSpecBuilder::new("ci")),
//!     config,
//!     tracing::Span::none(),
//! );
//! let scheduler = StepScheduler::new(Arc::new(orchestrator), tracing::Span::none());
//!
//! let stage = StageDefinition::new("build", vec![StepDefinition::new("compile", "rust:1")]);
//! let result = scheduler.run_stage(&stage, 1, logs).await;
//! assert!(result.success);
//!
//! while let Some(line) = rx.recv().await {
//!     println!("[{}] {}", line.step, line.content);
//! }
//! # });
//! ```

mod builder;
mod config;
mod container;
mod definition;
pub mod error;
mod orchestrator;
mod result;
mod scheduler;
pub mod verified;
mod waiter;

pub use builder::PodSpecBuilder;
pub use builder::STEP_CONTAINER_NAME;
pub use builder::StepPodSpecBuilder;
pub use config::EngineConfig;
pub use config::FailurePolicy;
pub use container::AwaitedContainer;
pub use container::ContainerRole;
pub use container::ContainerState;
pub use definition::StageDefinition;
pub use definition::StepDefinition;
pub use error::EngineError;
pub use error::Result;
pub use orchestrator::FinishedPod;
pub use orchestrator::LogLineKind;
pub use orchestrator::PodOrchestrator;
pub use orchestrator::StepLogLine;
pub use result::StageResult;
pub use result::StepResult;
pub use scheduler::StepScheduler;
pub use waiter::ContainerWaiter;
pub use waiter::DonePolicy;
pub use waiter::ExpectedStatus;
pub use waiter::ReadyPolicy;
