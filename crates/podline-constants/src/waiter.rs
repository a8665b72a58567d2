//! Container lifecycle waiter bounds.

// ============================================================================
// Polling
// ============================================================================

/// Delay between two pod status fetches while no container changed (100 ms).
pub const WAITER_POLL_INTERVAL_MS: u64 = 100;

/// Maximum number of status fetches a single `wait_next` call performs.
///
/// Tiger Style: 36 000 polls at the default interval bound one call to an
/// hour of wall time. Callers needing a tighter deadline wrap the whole run.
pub const MAX_WAITER_POLLS: u32 = 36_000;
