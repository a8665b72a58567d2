//! Error types for log stream sanitization.

use snafu::Snafu;

/// Result type for sanitization operations.
pub type Result<T> = std::result::Result<T, LogScanError>;

/// Sanitization failures. None of them fail a line; callers log and keep the raw bytes.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum LogScanError {
    /// The ANSI escape matcher could not be compiled.
    #[snafu(display("ANSI escape matcher unavailable: {reason}"))]
    AnsiMatcherUnavailable {
        /// Regex compilation failure.
        reason: String,
    },
}
