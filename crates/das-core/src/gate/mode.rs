//! Mode-dependent action tables.
//!
//! A gate that can hit an environmental condition (missing judge, judge
//! error) or a policy violation looks the condition up here to decide, per
//! [`Mode`], whether it blocks or merely warns.

use serde::{Deserialize, Serialize};

use crate::domain::{EvalContext, GateResult, Mode, Severity};

/// What a condition does in a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    #[default]
    HardFail,
    Warn,
    /// Record an `info` skip.
    Skip,
}

/// Conditions a gate resolves through the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Violation,
    MissingDependency,
    EvaluatorError,
}

/// Actions for one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeActions {
    pub on_violation: BlockAction,
    pub on_missing_dependency: BlockAction,
    pub on_evaluator_error: BlockAction,
}

impl Default for ModeActions {
    fn default() -> Self {
        Self {
            on_violation: BlockAction::HardFail,
            on_missing_dependency: BlockAction::HardFail,
            on_evaluator_error: BlockAction::HardFail,
        }
    }
}

/// `{seed: {...}, user: {...}}`. Unset entries block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModeActionTable {
    pub seed: ModeActions,
    pub user: ModeActions,
}

impl ModeActionTable {
    pub fn action(&self, mode: Mode, condition: Condition) -> BlockAction {
        let actions = match mode {
            Mode::Seed => &self.seed,
            Mode::User => &self.user,
        };
        match condition {
            Condition::Violation => actions.on_violation,
            Condition::MissingDependency => actions.on_missing_dependency,
            Condition::EvaluatorError => actions.on_evaluator_error,
        }
    }

    /// Build the gate result for `condition` in the context's mode.
    pub fn resolve(
        &self,
        gate_id: &str,
        ctx: &EvalContext,
        condition: Condition,
        reason: impl Into<String>,
    ) -> GateResult {
        match self.action(ctx.mode, condition) {
            BlockAction::HardFail => GateResult::fail(gate_id, Severity::HardFail, reason),
            BlockAction::Warn => GateResult::fail(gate_id, Severity::Warn, reason),
            BlockAction::Skip => GateResult::skipped(gate_id, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(mode: Mode) -> EvalContext {
        EvalContext {
            run_id: "r".into(),
            node_id: "n".into(),
            run_type: "test".into(),
            attempt: 1,
            candidate: 1,
            mode,
            persona: None,
        }
    }

    #[test]
    fn defaults_block_everywhere() {
        let table = ModeActionTable::default();
        for mode in [Mode::Seed, Mode::User] {
            let r = table.resolve("g", &ctx(mode), Condition::MissingDependency, "judge_missing");
            assert!(r.blocks());
        }
    }

    #[test]
    fn seed_blocks_user_warns() {
        let table: ModeActionTable = serde_json::from_value(serde_json::json!({
            "seed": {"on_missing_dependency": "hard_fail"},
            "user": {"on_missing_dependency": "warn"}
        }))
        .unwrap();

        let seed = table.resolve("g", &ctx(Mode::Seed), Condition::MissingDependency, "x");
        let user = table.resolve("g", &ctx(Mode::User), Condition::MissingDependency, "x");
        assert!(seed.blocks());
        assert!(!user.blocks());
        assert!(!user.ok);
        assert_eq!(user.severity, Severity::Warn);
    }

    #[test]
    fn skip_records_info() {
        let table = ModeActionTable {
            seed: ModeActions::default(),
            user: ModeActions {
                on_evaluator_error: BlockAction::Skip,
                ..ModeActions::default()
            },
        };
        let r = table.resolve("g", &ctx(Mode::User), Condition::EvaluatorError, "judge_down");
        assert!(r.ok);
        assert_eq!(r.severity, Severity::Info);
        assert_eq!(r.reason, "judge_down");
    }
}
