//! Compile-time constant assertions.
//!
//! Each assertion pins a relationship between constants that the engine
//! relies on, so a bad edit fails the build instead of a run.

use super::logs::*;
use super::waiter::*;

// ============================================================================
// Polling
// ============================================================================

const _: () = assert!(WAITER_POLL_INTERVAL_MS > 0);
const _: () = assert!(MAX_WAITER_POLLS > 0);
// one wait_next call is bounded by roughly an hour at the default interval
const _: () = assert!(WAITER_POLL_INTERVAL_MS * MAX_WAITER_POLLS as u64 <= 3_600_000);

// ============================================================================
// Log Forwarding
// ============================================================================

const _: () = assert!(LOG_CHANNEL_CAPACITY > 0);
const _: () = assert!(TRUNCATION_SUFFIX.len() < MAX_LOG_LINE_BYTES);
