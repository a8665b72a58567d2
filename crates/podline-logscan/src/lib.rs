//! Log stream sanitization for container output.
//!
//! Container logs arrive as raw terminal output: colour codes, cursor
//! movement and progress bars that redraw themselves with carriage returns.
//! This crate turns such a byte stream into stable text lines while the
//! stream is still open.
//!
//! # Pipeline
//!
//! ```text
//! raw bytes ──> split on '\n' ──> FromLastCR ──> RemoveAnsiCodes ──> line
//! ```
//!
//! Line splitting always happens on the raw bytes; each transform is
//! applied to one physical line and is toggled by [`SanitizeOptions`].
//!
//! # Example
//!
//! ```
//! use podline_logscan::SanitizeOptions;
//! use podline_logscan::sanitize_line;
//!
//! let line = sanitize_line(b"10%\r50%\r\x1b[32m100%\x1b[0m", SanitizeOptions::all(), &tracing::Span::none());
//! assert_eq!(line, "100%");
//! ```

pub mod error;
mod options;
mod sanitize;
mod scanner;

pub use error::LogScanError;
pub use error::Result;
pub use options::SanitizeFlag;
pub use options::SanitizeOptions;
pub use sanitize::from_last_cr;
pub use sanitize::remove_ansi_codes;
pub use sanitize::sanitize_line;
pub use scanner::LineScanner;
