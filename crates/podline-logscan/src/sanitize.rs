//! Pure per-line transforms.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::Span;
use tracing::warn;

use crate::SanitizeOptions;
use crate::error::AnsiMatcherUnavailableSnafu;
use crate::error::Result;

/// Matches CSI, OSC, DCS/SOS/PM/APC strings, then any remaining two-byte escape.
const ANSI_ESCAPE_PATTERN: &str = concat!(
    r"(?-u)\x1b\[[0-?]*[ -/]*[@-~]",
    r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)",
    r"|\x1b[PX^_][^\x1b]*\x1b\\",
    r"|\x1b[0-~]",
);

static ANSI_ESCAPE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(ANSI_ESCAPE_PATTERN));

/// Keep only the bytes after the last carriage return of `line`.
///
/// Emulates a terminal redrawing a progress bar: `"abc\rdef"` displays as
/// `"def"`, `"abc\r"` displays as `""`, and a line without `\r` is unchanged.
///
/// ```
/// use podline_logscan::from_last_cr;
///
/// assert_eq!(from_last_cr(b"abc\rdef"), b"def");
/// assert_eq!(from_last_cr(b"abc\r"), b"");
/// assert_eq!(from_last_cr(b"abc"), b"abc");
/// ```
pub fn from_last_cr(line: &[u8]) -> &[u8] {
    match line.iter().rposition(|&b| b == b'\r') {
        Some(pos) => &line[pos + 1..],
        None => line,
    }
}

/// Strip ANSI/VT escape sequences from `line`.
///
/// Borrows the input when nothing was stripped.
pub fn remove_ansi_codes(line: &[u8]) -> Result<Cow<'_, [u8]>> {
    match &*ANSI_ESCAPE {
        Ok(re) => Ok(re.replace_all(line, &b""[..])),
        Err(e) => AnsiMatcherUnavailableSnafu { reason: e.to_string() }.fail(),
    }
}

/// Apply the transforms selected by `options` to one physical line.
///
/// FromLastCR runs before RemoveAnsiCodes. A stripping failure keeps the
/// unstripped bytes and is logged under `span`; it never fails the line.
pub fn sanitize_line(raw: &[u8], options: SanitizeOptions, span: &Span) -> String {
    let mut line: Cow<'_, [u8]> = Cow::Borrowed(raw);

    if options.contains(SanitizeOptions::FROM_LAST_CR) {
        line = Cow::Borrowed(from_last_cr(raw));
    }

    if options.contains(SanitizeOptions::REMOVE_ANSI_CODES) {
        let stripped = match remove_ansi_codes(&line) {
            Ok(Cow::Owned(stripped)) => Some(stripped),
            Ok(Cow::Borrowed(_)) => None,
            Err(e) => {
                warn!(parent: span, error = %e, "failed to strip ANSI codes, keeping original line");
                None
            }
        };
        if let Some(stripped) = stripped {
            line = Cow::Owned(stripped);
        }
    }

    String::from_utf8_lossy(&line).into_owned()
}
