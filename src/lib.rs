//! Podline: pod-per-step CI build execution.
//!
//! Facade over the workspace crates:
//!
//! - [`constants`]: bounded resource limits
//! - [`logscan`]: sanitization of raw container log streams
//! - [`cluster`]: the cluster platform seam and its backends
//! - [`engine`]: container waiter, pod orchestrator and stage scheduler
//!
//! The engine types are also re-exported at the crate root.

pub use podline_cluster as cluster;
pub use podline_constants as constants;
pub use podline_engine as engine;
pub use podline_engine::*;
pub use podline_logscan as logscan;
