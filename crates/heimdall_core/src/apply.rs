//! Per-target registration queues with apply-once bookkeeping.
//!
//! Shared by the injector and the patcher.
//!
//! # Invariants
//! - Targets are visited in first-registration order.
//! - Items within a target keep registration order.
//! - `Applied` is terminal; a target is never visited again once applied.
//! - A target whose module failed to load returns to `Registered`.

use crate::resolver::ResolveError;
use indexmap::IndexMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lifecycle of one registered target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Registered,
    Applying,
    Applied,
}

#[derive(Debug)]
struct TargetQueue<T> {
    items: Vec<T>,
    state: TargetState,
}

/// Ordered per-target item queues.
#[derive(Debug)]
pub(crate) struct ApplyQueue<T> {
    targets: IndexMap<String, TargetQueue<T>>,
}

impl<T> Default for ApplyQueue<T> {
    fn default() -> Self {
        Self {
            targets: IndexMap::new(),
        }
    }
}

impl<T> ApplyQueue<T> {
    pub(crate) fn push(&mut self, target: &str, item: T) {
        self.targets
            .entry(target.to_string())
            .or_insert_with(|| TargetQueue {
                items: Vec::new(),
                state: TargetState::Registered,
            })
            .items
            .push(item);
    }

    /// Targets still waiting for an apply pass, in first-registration order.
    pub(crate) fn pending(&self) -> Vec<String> {
        self.targets
            .iter()
            .filter(|(_, queue)| queue.state != TargetState::Applied)
            .map(|(target, _)| target.clone())
            .collect()
    }

    pub(crate) fn items(&self, target: &str) -> &[T] {
        self.targets
            .get(target)
            .map(|queue| queue.items.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn set_state(&mut self, target: &str, state: TargetState) {
        if let Some(queue) = self.targets.get_mut(target) {
            queue.state = state;
        }
    }

    pub(crate) fn state(&self, target: &str) -> Option<TargetState> {
        self.targets.get(target).map(|queue| queue.state)
    }

    pub(crate) fn len(&self) -> usize {
        self.targets.len()
    }

    pub(crate) fn item_count(&self) -> usize {
        self.targets.values().map(|queue| queue.items.len()).sum()
    }
}

/// Why one target's pass stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The target module could not be resolved or imported.
    Resolve(ResolveError),
    /// A patch body failed; later patches for the target were not run.
    Patch { index: usize, message: String },
}

impl Display for ApplyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve(err) => write!(f, "{err}"),
            Self::Patch { index, message } => write!(f, "patch #{index} failed: {message}"),
        }
    }
}

impl Error for ApplyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Resolve(err) => Some(err),
            Self::Patch { .. } => None,
        }
    }
}

impl From<ResolveError> for ApplyError {
    fn from(value: ResolveError) -> Self {
        Self::Resolve(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: String,
    pub error: ApplyError,
}

/// Outcome of one `apply_all` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Targets processed during this pass, in order.
    pub applied: Vec<String>,
    /// Targets whose pass stopped on an error.
    pub failures: Vec<TargetFailure>,
    /// Items silently skipped as malformed (non-callable values and the like).
    pub skipped_items: usize,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn fail(&mut self, target: &str, error: ApplyError) {
        self.failures.push(TargetFailure {
            target: target.to_string(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplyQueue, TargetState};

    #[test]
    fn keeps_first_registration_order_across_targets() {
        let mut queue = ApplyQueue::default();
        queue.push("b", 1);
        queue.push("a", 2);
        queue.push("b", 3);

        assert_eq!(queue.pending(), vec!["b", "a"]);
        assert_eq!(queue.items("b"), &[1, 3]);
        assert_eq!(queue.item_count(), 3);
    }

    #[test]
    fn applied_targets_leave_the_pending_list() {
        let mut queue = ApplyQueue::default();
        queue.push("a", ());
        queue.push("b", ());
        queue.set_state("a", TargetState::Applied);

        assert_eq!(queue.pending(), vec!["b"]);
        assert_eq!(queue.state("a"), Some(TargetState::Applied));
        assert_eq!(queue.state("zzz"), None);
    }
}
