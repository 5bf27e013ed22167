//! Policy configuration document.
//!
//! ```toml
//! version = 1
//! unknown_gate_policy = "hard_fail"
//!
//! [defaults]
//! candidates_per_attempt = 2
//! max_attempts = 3
//! gates = [{ gate_id = "structural" }, { gate_id = "bounds" }]
//!
//! [nodes.routine]
//! max_attempts = 5
//!
//! [[test_only.force_failure]]
//! node = "routine"
//! attempts = [1]
//! ```
//!
//! The same document is accepted as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, Policy, PolicyPartial, Result, UnknownGatePolicy};
use crate::faults::ForcedFailures;
use crate::policy_resolver::resolve_policy;

/// The only document version this crate understands.
pub const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub version: u32,
    #[serde(default)]
    pub defaults: PolicyPartial,
    #[serde(default)]
    pub nodes: BTreeMap<String, PolicyPartial>,
    #[serde(default)]
    pub unknown_gate_policy: UnknownGatePolicy,
    /// Treat unknown gate ids as configuration errors at bind time.
    #[serde(default)]
    pub strict_gates: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_only: Option<TestOnly>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TestOnly {
    #[serde(default)]
    pub force_failure: Vec<ForceFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForceFailure {
    pub node: String,
    pub attempts: Vec<u32>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_VERSION,
            defaults: PolicyPartial::default(),
            nodes: BTreeMap::new(),
            unknown_gate_policy: UnknownGatePolicy::default(),
            strict_gates: false,
            test_only: None,
        }
    }
}

impl PolicyConfig {
    pub fn from_json_str(s: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()
    }

    pub fn from_toml_str(s: &str) -> std::result::Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()
    }

    fn validate(self) -> std::result::Result<Self, ConfigError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version));
        }
        Ok(self)
    }

    pub fn with_defaults(mut self, defaults: PolicyPartial) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_node(mut self, node_id: impl Into<String>, policy: PolicyPartial) -> Self {
        self.nodes.insert(node_id.into(), policy);
        self
    }

    pub fn with_unknown_gate_policy(mut self, policy: UnknownGatePolicy) -> Self {
        self.unknown_gate_policy = policy;
        self
    }

    pub fn with_forced_failure(mut self, node: impl Into<String>, attempts: Vec<u32>) -> Self {
        self.test_only
            .get_or_insert_with(TestOnly::default)
            .force_failure
            .push(ForceFailure {
                node: node.into(),
                attempts,
            });
        self
    }

    /// Resolved policy for `node_id` (defaults apply to unlisted nodes).
    pub fn resolve(&self, node_id: &str) -> std::result::Result<Policy, ConfigError> {
        resolve_policy(node_id, &self.defaults, self.nodes.get(node_id))
    }

    /// Fault table from the `test_only` block; empty when absent.
    pub fn forced_failures(&self) -> ForcedFailures {
        self.test_only
            .iter()
            .flat_map(|t| &t.force_failure)
            .fold(ForcedFailures::new(), |faults, f| {
                faults.fail(f.node.clone(), f.attempts.iter().copied())
            })
    }
}

/// Load a policy document; `.toml` files are parsed as TOML, anything else as JSON.
pub fn load_policy_config(path: &Path) -> Result<PolicyConfig> {
    let text = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    let config = if is_toml {
        PolicyConfig::from_toml_str(&text)?
    } else {
        PolicyConfig::from_json_str(&text)?
    };
    tracing::debug!(path = %path.display(), nodes = config.nodes.len(), "policy config loaded");
    Ok(config)
}
