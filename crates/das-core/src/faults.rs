//! Fault-injection seam consulted once per attempt.
//!
//! Test harnesses use [`ForcedFailures`] to fail chosen attempts
//! deterministically; production runs use [`NoFaults`].

use std::collections::{BTreeMap, BTreeSet};

/// Decides whether an attempt is force-failed before any generation.
pub trait FaultInjector: Send + Sync {
    /// Reason to record when `attempt` of `node_id` must fail.
    fn forced_failure(&self, node_id: &str, attempt: u32) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn forced_failure(&self, _node_id: &str, _attempt: u32) -> Option<String> {
        None
    }
}

/// Fixed `node -> attempts` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForcedFailures {
    attempts: BTreeMap<String, BTreeSet<u32>>,
}

impl ForcedFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, node_id: impl Into<String>, attempts: impl IntoIterator<Item = u32>) -> Self {
        self.attempts
            .entry(node_id.into())
            .or_default()
            .extend(attempts);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.values().all(BTreeSet::is_empty)
    }
}

impl FaultInjector for ForcedFailures {
    fn forced_failure(&self, node_id: &str, attempt: u32) -> Option<String> {
        self.attempts
            .get(node_id)
            .filter(|set| set.contains(&attempt))
            .map(|_| "forced_failure".to_string())
    }
}
