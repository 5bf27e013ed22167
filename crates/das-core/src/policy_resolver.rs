//! Overlay a node's partial policy onto the process-wide defaults.
//!
//! Scalars take the node value, else the default, else the hard minimum
//! (`enabled = true`, one candidate, one attempt, `stop_run`). `params` is
//! a shallow merge with node keys winning. A node gate list replaces the
//! default list outright.

use crate::domain::{ConfigError, OnHardFail, Policy, PolicyPartial};

/// Resolve the concrete policy for `node_id`.
pub fn resolve_policy(
    node_id: &str,
    defaults: &PolicyPartial,
    node: Option<&PolicyPartial>,
) -> Result<Policy, ConfigError> {
    let empty = PolicyPartial::default();
    let node = node.unwrap_or(&empty);

    let enabled = node.enabled.or(defaults.enabled).unwrap_or(true);
    let k = node
        .candidates_per_attempt
        .or(defaults.candidates_per_attempt)
        .unwrap_or(1);
    let m = node.max_attempts.or(defaults.max_attempts).unwrap_or(1);
    let on_hard_fail = node
        .on_hard_fail
        .or(defaults.on_hard_fail)
        .unwrap_or(OnHardFail::StopRun);

    let candidates_per_attempt = positive(k).ok_or_else(|| ConfigError::InvalidCandidateCount {
        node: node_id.to_string(),
        value: k,
    })?;
    let max_attempts = positive(m).ok_or_else(|| ConfigError::InvalidAttemptCount {
        node: node_id.to_string(),
        value: m,
    })?;

    let gates = node
        .gates
        .as_ref()
        .or(defaults.gates.as_ref())
        .cloned()
        .unwrap_or_default();

    let mut params = defaults.params.clone().unwrap_or_default();
    if let Some(overrides) = &node.params {
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let policy = Policy {
        enabled,
        candidates_per_attempt,
        max_attempts,
        gates,
        on_hard_fail,
        params,
    };
    if policy.generation_budget().is_none() {
        return Err(ConfigError::GenerationBudgetOverflow {
            node: node_id.to_string(),
            candidates: candidates_per_attempt,
            attempts: max_attempts,
        });
    }
    Ok(policy)
}

fn positive(value: i64) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v >= 1)
}
