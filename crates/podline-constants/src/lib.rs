//! Centralized constants for the podline build engine.
//!
//! Every poll loop, buffer and channel in the engine is bounded by a value
//! defined here, grouped by the component that consumes it.
//!
//! Tiger Style: Constants are fixed and immutable, enforced at compile time.
//! Each constant has explicit bounds to prevent unbounded resource allocation.
//!
//! # Modules
//!
//! - [`waiter`]: Container lifecycle polling
//! - [`logs`]: Log stream scanning and forwarding
//!
//! # Usage
//!
//! ```
//! use podline_constants::waiter::WAITER_POLL_INTERVAL_MS;
//!
//! assert_eq!(WAITER_POLL_INTERVAL_MS, 100);
//! ```

mod assertions;
pub mod logs;
pub mod waiter;

pub use logs::LOG_CHANNEL_CAPACITY;
pub use logs::MAX_LOG_LINE_BYTES;
pub use logs::TRUNCATION_SUFFIX;
pub use waiter::MAX_WAITER_POLLS;
pub use waiter::WAITER_POLL_INTERVAL_MS;
