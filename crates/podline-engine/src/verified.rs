//! Pure functions for engine decisions.
//!
//! Everything here is deterministic and free of I/O so the async code paths
//! stay thin and the decisions can be tested directly.
//!
//! # Tiger Style
//!
//! - Pure functions with no side effects
//! - Deterministic: same inputs always produce same outputs
//! - Saturating arithmetic for overflow safety

use std::time::Duration;

use crate::container::AwaitedContainer;
use crate::container::ContainerState;

/// Derive a lifecycle state from which status branches are present.
///
/// The first present branch wins, in waiting, running, terminated order.
///
/// # Example
///
/// ```
/// use podline_engine::ContainerState;
/// use podline_engine::verified::derive_container_state;
///
/// assert_eq!(derive_container_state(true, true, false), ContainerState::Waiting);
/// assert_eq!(derive_container_state(false, true, true), ContainerState::Running);
/// assert_eq!(derive_container_state(false, false, true), ContainerState::Terminated);
/// assert_eq!(derive_container_state(false, false, false), ContainerState::Unknown);
/// ```
#[inline]
pub const fn derive_container_state(waiting: bool, running: bool, terminated: bool) -> ContainerState {
    if waiting {
        ContainerState::Waiting
    } else if running {
        ContainerState::Running
    } else if terminated {
        ContainerState::Terminated
    } else {
        ContainerState::Unknown
    }
}

/// Check whether a waiter has used up its poll budget.
///
/// # Example
///
/// ```
/// use podline_engine::verified::is_poll_limit_reached;
///
/// assert!(!is_poll_limit_reached(3, 10));
/// assert!(is_poll_limit_reached(10, 10));
/// ```
#[inline]
pub const fn is_poll_limit_reached(polls: u32, max_polls: u32) -> bool {
    polls >= max_polls
}

/// A stage succeeds only if every step succeeded. An empty stage succeeds.
///
/// # Example
///
/// ```
/// use podline_engine::verified::is_stage_successful;
///
/// assert!(is_stage_successful([true, true]));
/// assert!(!is_stage_successful([true, false, true]));
/// assert!(is_stage_successful([]));
/// ```
pub fn is_stage_successful(step_successes: impl IntoIterator<Item = bool>) -> bool {
    step_successes.into_iter().all(|ok| ok)
}

/// First container, in the given order, that terminated with a non-zero exit code.
pub fn first_failed_container<'a>(
    containers: impl IntoIterator<Item = &'a AwaitedContainer>,
) -> Option<&'a AwaitedContainer> {
    containers.into_iter().find(|c| matches!(c.exit_code, Some(code) if code != 0))
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use podline_engine::verified::duration_ms;
///
/// assert_eq!(duration_ms(Duration::from_secs(2)), 2_000);
/// assert_eq!(duration_ms(Duration::MAX), u64::MAX);
/// ```
#[inline]
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Maximum length of a DNS label, a pod name and a label value.
const MAX_DNS_LABEL_LEN: usize = 63;

/// Hex characters of the name hash carried by every pod name.
const POD_NAME_HASH_LEN: usize = 6;

/// Deterministic pod name for one step of one build.
///
/// Lowercases, maps every character outside `[a-z0-9-]` to `-`, collapses
/// runs of `-` and trims them from both ends of each segment, then joins
/// `stage-step-hash-build_id`. `hash` is taken from the raw stage and step
/// names, so steps whose names clean up to the same text still get distinct
/// pods. The result is cut to the 63-character limit of a DNS label without
/// leaving a trailing `-`.
///
/// # Example
///
/// ```
/// use podline_engine::verified::pod_name;
///
/// let name = pod_name("Build", "unit tests", 42);
/// assert!(name.starts_with("build-unit-tests-"));
/// assert!(name.ends_with("-42"));
/// assert_ne!(name, pod_name("Build", "unit-tests", 42));
/// ```
pub fn pod_name(stage: &str, step: &str, build_id: u64) -> String {
    let mut name = String::with_capacity(MAX_DNS_LABEL_LEN);
    for segment in [stage, step] {
        let cleaned = dns_segment(segment);
        if !cleaned.is_empty() {
            name.push_str(&cleaned);
            name.push('-');
        }
    }
    let suffix = format!("{}-{build_id}", name_hash(stage, step));
    let budget = MAX_DNS_LABEL_LEN.saturating_sub(suffix.len());
    if name.len() > budget {
        name.truncate(budget.saturating_sub(1));
        while name.ends_with('-') {
            name.pop();
        }
        name.push('-');
    }
    name.push_str(&suffix);
    name
}

/// Kubernetes-safe label value for `raw`.
///
/// Keeps `[A-Za-z0-9._-]`, maps every other character to `-`, trims
/// non-alphanumerics from both ends and cuts the result to 63 characters.
/// An input with no alphanumerics yields the empty value.
///
/// # Example
///
/// ```
/// use podline_engine::verified::label_value;
///
/// assert_eq!(label_value("unit tests"), "unit-tests");
/// assert_eq!(label_value("  v1.2_rc "), "v1.2_rc");
/// assert_eq!(label_value("!!"), "");
/// ```
pub fn label_value(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .collect();
    let mut value: String = mapped.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_string();
    if value.len() > MAX_DNS_LABEL_LEN {
        value.truncate(MAX_DNS_LABEL_LEN);
        while value.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
            value.pop();
        }
    }
    value
}

fn name_hash(stage: &str, step: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(stage.as_bytes());
    hasher.update(&[0]);
    hasher.update(step.as_bytes());
    let mut hex = hasher.finalize().to_hex().to_string();
    hex.truncate(POD_NAME_HASH_LEN);
    hex
}

fn dns_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
