//! Instruction payloads - the state deltas and checks attached to phases
//! and transitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One typed mutation of the state tree.
///
/// Paths are dot-paths into `game.*` or `players.<id>.*`. They may carry
/// player-template placeholders (`{{player1id}}`, `players.p1.`) until the
/// resolver runs; the delta engine itself only ever sees concrete paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StateDeltaOp {
    /// Overwrite the leaf at `path`, creating intermediate objects.
    Set { path: String, value: Value },
    /// Numeric add. Fails if the existing leaf is not numeric.
    Increment { path: String, amount: f64 },
    /// Push onto an array leaf, creating an empty array if absent.
    Append { path: String, value: Value },
    /// Remove the leaf. No-op if already absent.
    Delete { path: String },
    /// Atomically decrement `fromPath` and increment `toPath`.
    Transfer {
        from_path: String,
        to_path: String,
        amount: f64,
    },
    /// Shallow-merge an object into the leaf, preserving keys the incoming
    /// value does not mention.
    Merge { path: String, value: Value },
    /// Draw one of `choices` under the given categorical distribution and
    /// write it to `path`. The written value is the permanent record of the
    /// draw.
    Rng {
        path: String,
        choices: Vec<Value>,
        probabilities: Vec<f64>,
    },
}

impl StateDeltaOp {
    /// Every dot-path this op touches.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            StateDeltaOp::Set { path, .. }
            | StateDeltaOp::Increment { path, .. }
            | StateDeltaOp::Append { path, .. }
            | StateDeltaOp::Delete { path }
            | StateDeltaOp::Merge { path, .. }
            | StateDeltaOp::Rng { path, .. } => vec![path],
            StateDeltaOp::Transfer {
                from_path, to_path, ..
            } => vec![from_path, to_path],
        }
    }
}

/// An ordered precondition + error message pair guarding a player action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationCheck {
    /// JSON-logic tree evaluated with the pending action as `input`.
    pub precondition: Value,
    /// Written to the player's `privateMessage` when the check fails.
    pub error_message: String,
}

/// Ordered action-validation checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Validation {
    #[serde(default)]
    pub checks: Vec<ValidationCheck>,
}

/// The payload executed when a phase action is accepted or a transition
/// fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    #[serde(default)]
    pub state_delta: Vec<StateDeltaOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    /// Free-form guidance consumed by the external LLM-execution
    /// collaborator, never by this core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanics_guidance: Option<Value>,
    /// RNG guidance for the external collaborator, never read here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_config: Option<Value>,
}

impl Instruction {
    pub fn new(state_delta: Vec<StateDeltaOp>) -> Self {
        Self {
            state_delta,
            ..Self::default()
        }
    }

    pub fn with_check(mut self, precondition: Value, error_message: impl Into<String>) -> Self {
        self.validation
            .get_or_insert_with(Validation::default)
            .checks
            .push(ValidationCheck {
                precondition,
                error_message: error_message.into(),
            });
        self
    }
}

/// All instruction payloads for one artifact set: player-action instructions
/// keyed by phase name, transition instructions keyed by transition id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstructionSet {
    #[serde(default)]
    pub player_phase_instructions: BTreeMap<String, Instruction>,
    #[serde(default)]
    pub transition_instructions: BTreeMap<String, Instruction>,
}

impl InstructionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phase_instruction(
        mut self,
        phase: impl Into<String>,
        instruction: Instruction,
    ) -> Self {
        self.player_phase_instructions
            .insert(phase.into(), instruction);
        self
    }

    pub fn with_transition_instruction(
        mut self,
        transition_id: impl Into<String>,
        instruction: Instruction,
    ) -> Self {
        self.transition_instructions
            .insert(transition_id.into(), instruction);
        self
    }

    pub fn for_phase(&self, phase: &str) -> Option<&Instruction> {
        self.player_phase_instructions.get(phase)
    }

    pub fn for_transition(&self, transition_id: &str) -> Option<&Instruction> {
        self.transition_instructions.get(transition_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_op_wire_format() {
        let op: StateDeltaOp = serde_json::from_value(json!({
            "op": "transfer",
            "fromPath": "players.p1.chips",
            "toPath": "game.pot",
            "amount": 25.0
        }))
        .unwrap();
        assert_eq!(
            op,
            StateDeltaOp::Transfer {
                from_path: "players.p1.chips".into(),
                to_path: "game.pot".into(),
                amount: 25.0,
            }
        );

        let back = serde_json::to_value(&op).unwrap();
        assert_eq!(back["op"], json!("transfer"));
        assert_eq!(back["fromPath"], json!("players.p1.chips"));
    }

    #[test]
    fn test_rng_op_wire_format() {
        let op: StateDeltaOp = serde_json::from_value(json!({
            "op": "rng",
            "path": "game.firstPlayer",
            "choices": ["player1", "player2"],
            "probabilities": [0.5, 0.5]
        }))
        .unwrap();
        match op {
            StateDeltaOp::Rng { choices, probabilities, .. } => {
                assert_eq!(choices.len(), 2);
                assert_eq!(probabilities, vec![0.5, 0.5]);
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[test]
    fn test_op_paths() {
        let op = StateDeltaOp::Transfer {
            from_path: "a.b".into(),
            to_path: "c.d".into(),
            amount: 1.0,
        };
        assert_eq!(op.paths(), vec!["a.b", "c.d"]);

        let op = StateDeltaOp::Delete { path: "game.x".into() };
        assert_eq!(op.paths(), vec!["game.x"]);
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let result: Result<StateDeltaOp, _> =
            serde_json::from_value(json!({ "op": "shuffle", "path": "game.deck" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_instruction_defaults() {
        let instruction: Instruction = serde_json::from_value(json!({
            "stateDelta": [
                { "op": "set", "path": "game.round", "value": 1 }
            ]
        }))
        .unwrap();
        assert_eq!(instruction.state_delta.len(), 1);
        assert!(instruction.validation.is_none());
        assert!(instruction.mechanics_guidance.is_none());
    }

    #[test]
    fn test_instruction_checks_preserve_order() {
        let instruction = Instruction::new(vec![])
            .with_check(json!({"==": [1, 1]}), "first")
            .with_check(json!({"==": [2, 2]}), "second");
        let checks = &instruction.validation.unwrap().checks;
        assert_eq!(checks[0].error_message, "first");
        assert_eq!(checks[1].error_message, "second");
    }

    #[test]
    fn test_instruction_set_lookup() {
        let set = InstructionSet::new()
            .with_phase_instruction("playing", Instruction::default())
            .with_transition_instruction("t_end", Instruction::default());
        assert!(set.for_phase("playing").is_some());
        assert!(set.for_phase("setup").is_none());
        assert!(set.for_transition("t_end").is_some());
        assert!(set.for_transition("t_start").is_none());
    }
}
