//! Incremental line scanner over an open byte stream.

use std::io;

use podline_constants::MAX_LOG_LINE_BYTES;
use podline_constants::TRUNCATION_SUFFIX;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tracing::Span;
use tracing::debug;
use tracing::warn;

use crate::SanitizeOptions;
use crate::sanitize::sanitize_line;

/// Lazy, finite, non-restartable sequence of sanitized lines.
///
/// Drive it with [`advance`](Self::advance); while it returns `true`,
/// [`line`](Self::line) holds the current line. Once it returns `false`
/// the sequence is over for good and [`error`](Self::error) reports
/// whether the underlying stream failed or simply ended.
///
/// Lines are split on `\n`. A single `\r` immediately before the
/// terminator (or before the end of the stream) belongs to the line
/// ending, not to the line content.
///
/// ```
/// # tokio_test_block(async {
/// use podline_logscan::LineScanner;
/// use podline_logscan::SanitizeOptions;
///
/// let mut scanner = LineScanner::new(&b"one\r\ntw\x1b[1mo\n"[..], SanitizeOptions::all(), tracing::Span::none());
/// let mut lines = Vec::new();
/// while scanner.advance().await {
///     lines.push(scanner.line().to_string());
/// }
/// assert_eq!(lines, ["one", "two"]);
/// assert!(scanner.error().is_none());
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
/// # }
/// ```
pub struct LineScanner<R> {
    reader: R,
    options: SanitizeOptions,
    /// Parent span for every event this scanner emits.
    span: Span,
    /// Raw bytes of the line being assembled.
    raw: Vec<u8>,
    /// Sanitized current line.
    line: String,
    error: Option<io::Error>,
    finished: bool,
    lines_read: u64,
}

impl<R: AsyncBufRead + Unpin> LineScanner<R> {
    /// Create a scanner over `reader`.
    pub fn new(reader: R, options: SanitizeOptions, span: Span) -> Self {
        Self {
            reader,
            options,
            span,
            raw: Vec::new(),
            line: String::new(),
            error: None,
            finished: false,
            lines_read: 0,
        }
    }

    /// Move to the next line.
    ///
    /// Returns `false` at end of stream or after a read failure; every
    /// later call also returns `false`.
    pub async fn advance(&mut self) -> bool {
        if self.finished {
            return false;
        }

        match self.read_raw_line().await {
            Ok(Some(truncated)) => {
                self.line = sanitize_line(&self.raw, self.options, &self.span);
                if truncated {
                    warn!(
                        parent: &self.span,
                        line_number = self.lines_read + 1,
                        max_bytes = MAX_LOG_LINE_BYTES,
                        "log line exceeded maximum length, truncated"
                    );
                    self.line.push_str(TRUNCATION_SUFFIX);
                }
                self.lines_read += 1;
                true
            }
            Ok(None) => {
                debug!(parent: &self.span, lines = self.lines_read, "log stream ended");
                self.finish();
                false
            }
            Err(e) => {
                warn!(parent: &self.span, lines = self.lines_read, error = %e, "log stream read failed");
                self.error = Some(e);
                self.finish();
                false
            }
        }
    }

    /// The current line. Empty before the first `advance` and after the end.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The stream failure that ended the sequence, if any.
    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    /// Consume the scanner, yielding the stream failure if any.
    pub fn into_error(self) -> Option<io::Error> {
        self.error
    }

    /// Number of lines produced so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    fn finish(&mut self) {
        self.finished = true;
        self.line.clear();
        self.raw = Vec::new();
    }

    /// Read one physical line into `self.raw`.
    ///
    /// Returns `None` at a clean end of stream, otherwise whether the line
    /// was cut at [`MAX_LOG_LINE_BYTES`].
    async fn read_raw_line(&mut self) -> io::Result<Option<bool>> {
        self.raw.clear();
        let mut saw_bytes = false;
        let mut truncated = false;

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            saw_bytes = true;

            let newline = available.iter().position(|&b| b == b'\n');
            let mut chunk = match newline {
                Some(pos) => &available[..pos],
                None => available,
            };
            let consumed = chunk.len() + usize::from(newline.is_some());

            if self.options.contains(SanitizeOptions::FROM_LAST_CR) {
                // A '\r' followed by more bytes of the same line hides everything
                // before it. The '\r' itself is kept so a trailing one can still
                // be told apart from the line ending.
                if !truncated && !chunk.is_empty() && self.raw.last() == Some(&b'\r') {
                    self.raw.drain(..self.raw.len() - 1);
                }
                let searchable = chunk.len().saturating_sub(1);
                if let Some(pos) = chunk[..searchable].iter().rposition(|&b| b == b'\r') {
                    self.raw.clear();
                    truncated = false;
                    chunk = &chunk[pos..];
                }
            }

            let room = MAX_LOG_LINE_BYTES.saturating_sub(self.raw.len());
            if chunk.len() > room {
                self.raw.extend_from_slice(&chunk[..room]);
                truncated = true;
            } else {
                self.raw.extend_from_slice(chunk);
            }

            self.reader.consume(consumed);
            if newline.is_some() {
                break;
            }
        }

        if !saw_bytes {
            return Ok(None);
        }

        if !truncated && self.raw.last() == Some(&b'\r') {
            self.raw.pop();
        }

        Ok(Some(truncated))
    }
}
