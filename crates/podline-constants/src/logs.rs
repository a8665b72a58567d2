//! Log scanning and forwarding bounds.

// ============================================================================
// Line Scanning
// ============================================================================

/// Maximum length of one sanitized log line in bytes (64 KB).
///
/// Tiger Style: The remainder of a longer physical line is discarded so a
/// single runaway progress bar cannot grow the scan buffer without bound.
pub const MAX_LOG_LINE_BYTES: usize = 64 * 1024;

/// Marker appended to a line that hit [`MAX_LOG_LINE_BYTES`].
pub const TRUNCATION_SUFFIX: &str = "...[truncated]";

// ============================================================================
// Forwarding
// ============================================================================

/// Channel buffer capacity for forwarded log lines.
///
/// Tiger Style: Bounded to provide backpressure when the log sink is slow.
pub const LOG_CHANNEL_CAPACITY: usize = 1000;
