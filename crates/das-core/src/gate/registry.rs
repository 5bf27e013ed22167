//! Gate lookup table and policy binding.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{ConfigError, GateInstance, Policy, UnknownGatePolicy};
use crate::gate::builtin::{bounds::BoundsGate, structural::StructuralGate};
use crate::gate::{Gate, GateParams};

/// Explicit, constructed gate table. Owned by the caller and passed by
/// reference into the orchestrator.
#[derive(Default, Clone)]
pub struct GateRegistry {
    gates: BTreeMap<String, Arc<dyn Gate>>,
}

impl std::fmt::Debug for GateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateRegistry")
            .field("gates", &self.gates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the dependency-free built-ins (`structural`, `bounds`).
    pub fn standard() -> Self {
        Self::new()
            .with_gate(Arc::new(StructuralGate))
            .with_gate(Arc::new(BoundsGate))
    }

    /// Register a gate, returning any gate previously registered under its id.
    pub fn register(&mut self, gate: Arc<dyn Gate>) -> Option<Arc<dyn Gate>> {
        self.gates.insert(gate.id().to_string(), gate)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_gate(mut self, gate: Arc<dyn Gate>) -> Self {
        self.register(gate);
        self
    }

    pub fn contains(&self, gate_id: &str) -> bool {
        self.gates.contains_key(gate_id)
    }

    /// Bind a node's gate list, validating params of every known gate.
    ///
    /// Unknown ids are kept and resolved per `unknown` at evaluation time,
    /// unless `strict` is set, in which case they are a configuration error.
    pub fn bind(
        &self,
        node_id: &str,
        policy: &Policy,
        unknown: UnknownGatePolicy,
        strict: bool,
    ) -> Result<BoundGates, ConfigError> {
        let mut gates = Vec::with_capacity(policy.gates.len());
        for instance in &policy.gates {
            if let Some(weight) = instance.score_weight {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(ConfigError::InvalidScoreWeight {
                        gate_id: instance.gate_id.clone(),
                        value: weight,
                    });
                }
            }
            let bound = match self.gates.get(&instance.gate_id) {
                Some(gate) => BoundGate {
                    instance: instance.clone(),
                    params: Some(gate.parse_params(instance.params.as_ref())?),
                    gate: Some(Arc::clone(gate)),
                },
                None if strict => {
                    return Err(ConfigError::UnknownGate {
                        node: node_id.to_string(),
                        gate_id: instance.gate_id.clone(),
                    })
                }
                None => BoundGate {
                    instance: instance.clone(),
                    params: None,
                    gate: None,
                },
            };
            gates.push(bound);
        }
        Ok(BoundGates {
            node_id: node_id.to_string(),
            gates,
            unknown,
        })
    }
}

/// One configured gate, resolved against the registry.
#[derive(Clone)]
pub struct BoundGate {
    pub instance: GateInstance,
    /// `None` when the id is not registered.
    pub gate: Option<Arc<dyn Gate>>,
    pub params: Option<GateParams>,
}

impl std::fmt::Debug for BoundGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundGate")
            .field("gate_id", &self.instance.gate_id)
            .field("registered", &self.gate.is_some())
            .field("params", &self.params)
            .finish()
    }
}

/// A node's gate list, ready to evaluate candidates.
#[derive(Debug, Clone)]
pub struct BoundGates {
    pub node_id: String,
    pub gates: Vec<BoundGate>,
    pub unknown: UnknownGatePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OnHardFail;
    use serde_json::json;

    fn policy(gates: Vec<GateInstance>) -> Policy {
        Policy {
            enabled: true,
            candidates_per_attempt: 1,
            max_attempts: 1,
            gates,
            on_hard_fail: OnHardFail::StopRun,
            params: Default::default(),
        }
    }

    #[test]
    fn standard_has_builtins() {
        let reg = GateRegistry::standard();
        assert!(reg.contains("structural"));
        assert!(reg.contains("bounds"));
        assert!(!reg.contains("pii"));
    }

    #[test]
    fn bind_keeps_unknown_when_lenient() {
        let reg = GateRegistry::standard();
        let bound = reg
            .bind(
                "n",
                &policy(vec![GateInstance::new("nope")]),
                UnknownGatePolicy::Warn,
                false,
            )
            .unwrap();
        assert_eq!(bound.gates.len(), 1);
        assert!(bound.gates[0].gate.is_none());
    }

    #[test]
    fn bind_rejects_unknown_when_strict() {
        let reg = GateRegistry::standard();
        let err = reg
            .bind(
                "n",
                &policy(vec![GateInstance::new("nope")]),
                UnknownGatePolicy::HardFail,
                true,
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownGate { .. }));
    }

    #[test]
    fn bind_rejects_malformed_params() {
        let reg = GateRegistry::standard();
        let bad = GateInstance::new("structural").with_params(json!({"required": "not-a-list"}));
        let err = reg
            .bind("n", &policy(vec![bad]), UnknownGatePolicy::HardFail, false)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGateParams { .. }));
    }

    #[test]
    fn bind_rejects_negative_weight() {
        let reg = GateRegistry::standard();
        let g = GateInstance::new("bounds").with_score_weight(-1.0);
        let err = reg
            .bind("n", &policy(vec![g]), UnknownGatePolicy::HardFail, false)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidScoreWeight { .. }));
    }
}
