//! Expected-status policies.

use crate::container::AwaitedContainer;
use crate::container::ContainerState;

/// What a [`ContainerWaiter`](super::ContainerWaiter) waits for.
pub trait ExpectedStatus: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// True if `container` has reached the awaited status.
    fn is_expected(&self, container: &AwaitedContainer) -> bool;

    /// True if `new` differs from `old` in what this policy observes.
    fn has_changed(&self, old: &AwaitedContainer, new: &AwaitedContainer) -> bool;
}

/// Waits for containers to report ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadyPolicy;

impl ExpectedStatus for ReadyPolicy {
    fn name(&self) -> &'static str {
        "ready"
    }

    fn is_expected(&self, container: &AwaitedContainer) -> bool {
        container.ready
    }

    fn has_changed(&self, old: &AwaitedContainer, new: &AwaitedContainer) -> bool {
        old.ready != new.ready
    }
}

/// Waits for containers to terminate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DonePolicy;

impl ExpectedStatus for DonePolicy {
    fn name(&self) -> &'static str {
        "done"
    }

    fn is_expected(&self, container: &AwaitedContainer) -> bool {
        container.state == ContainerState::Terminated
    }

    fn has_changed(&self, old: &AwaitedContainer, new: &AwaitedContainer) -> bool {
        old.state != new.state
    }
}
