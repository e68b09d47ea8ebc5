//! State-delta engine - applies typed mutation operations to the state tree.
//!
//! Ops are applied in array order; each mutation is visible to subsequent
//! ops in the same batch. The engine only ever sees concrete dot-paths: the
//! resolver has already rewritten player templates, and an op that still
//! carries a placeholder is rejected rather than silently misapplied.

use game_artifacts::{GameState, StateDeltaOp};
use serde_json::{Map, Value};

use crate::error::EngineError;
use crate::logic::number_value;
use crate::rng::GameRng;

/// How far the probabilities of an `rng` op may drift from summing to 1.
const RNG_PROBABILITY_TOLERANCE: f64 = 0.01;

/// Apply a batch of ops to the state, in order.
pub fn apply(
    state: &mut GameState,
    ops: &[StateDeltaOp],
    rng: &mut GameRng,
) -> Result<(), EngineError> {
    for op in ops {
        apply_op(state, op, rng)?;
    }
    Ok(())
}

fn apply_op(state: &mut GameState, op: &StateDeltaOp, rng: &mut GameRng) -> Result<(), EngineError> {
    for path in op.paths() {
        if path.contains("{{") {
            return Err(EngineError::TemplateUnresolved {
                path: path.to_string(),
            });
        }
    }

    match op {
        StateDeltaOp::Set { path, value } => {
            state.set_path(path, value.clone())?;
        }
        StateDeltaOp::Increment { path, amount } => {
            let current = read_number(state, path)?;
            state.set_path(path, number_value(current + amount))?;
        }
        StateDeltaOp::Append { path, value } => {
            let mut items = match state.get_path(path) {
                None => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(other) => return Err(type_mismatch(path, "array", other)),
            };
            items.push(value.clone());
            state.set_path(path, Value::Array(items))?;
        }
        StateDeltaOp::Delete { path } => {
            state.remove_path(path);
        }
        StateDeltaOp::Transfer {
            from_path,
            to_path,
            amount,
        } => {
            // Validate both leaves before writing either, so a mismatch
            // cannot leave a half-applied transfer.
            let from = read_number(state, from_path)?;
            let to = read_number(state, to_path)?;
            state.set_path(from_path, number_value(from - amount))?;
            state.set_path(to_path, number_value(to + amount))?;
        }
        StateDeltaOp::Merge { path, value } => {
            let incoming = match value {
                Value::Object(map) => map,
                other => return Err(type_mismatch(path, "object", other)),
            };
            let mut merged = match state.get_path(path) {
                None => Map::new(),
                Some(Value::Object(existing)) => existing.clone(),
                Some(other) => return Err(type_mismatch(path, "object", other)),
            };
            for (key, item) in incoming {
                merged.insert(key.clone(), item.clone());
            }
            state.set_path(path, Value::Object(merged))?;
        }
        StateDeltaOp::Rng {
            path,
            choices,
            probabilities,
        } => {
            let drawn = draw(path, choices, probabilities, rng)?;
            state.set_path(path, drawn)?;
        }
    }
    Ok(())
}

/// Read a numeric leaf. Absent leaves count as zero; anything non-numeric
/// is a contract violation of the validated artifacts.
fn read_number(state: &GameState, path: &str) -> Result<f64, EngineError> {
    match state.get_path(path) {
        None => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| type_mismatch(path, "number", &Value::Number(n.clone()))),
        Some(other) => Err(type_mismatch(path, "number", other)),
    }
}

fn draw(
    path: &str,
    choices: &[Value],
    probabilities: &[f64],
    rng: &mut GameRng,
) -> Result<Value, EngineError> {
    if choices.is_empty() {
        return Err(bad_rng(path, "choices are empty"));
    }
    if choices.len() != probabilities.len() {
        return Err(bad_rng(
            path,
            format!(
                "{} choices but {} probabilities",
                choices.len(),
                probabilities.len()
            ),
        ));
    }
    let total: f64 = probabilities.iter().sum();
    if (total - 1.0).abs() > RNG_PROBABILITY_TOLERANCE {
        return Err(bad_rng(path, format!("probabilities sum to {total}")));
    }
    let index = rng
        .choose_weighted(probabilities)
        .ok_or_else(|| bad_rng(path, "no probability mass"))?;
    Ok(choices[index].clone())
}

fn type_mismatch(path: &str, expected: &'static str, found: &Value) -> EngineError {
    EngineError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: value_kind(found).to_string(),
    }
}

fn bad_rng(path: &str, reason: impl Into<String>) -> EngineError {
    EngineError::BadRngSpec {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_artifacts::PlayerId;
    use serde_json::json;

    fn fixture() -> (GameState, PlayerId, GameRng) {
        let mut state = GameState::new();
        let player = PlayerId::new();
        state.add_player(player, Map::new());
        (state, player, GameRng::new(42))
    }

    #[test]
    fn test_set_and_delete() {
        let (mut state, _, mut rng) = fixture();
        let ops = vec![
            StateDeltaOp::Set {
                path: "game.pot.chips".into(),
                value: json!(50),
            },
            StateDeltaOp::Delete {
                path: "game.pot.chips".into(),
            },
            StateDeltaOp::Delete {
                path: "game.neverExisted".into(),
            },
        ];
        apply(&mut state, &ops, &mut rng).unwrap();
        assert_eq!(state.get_path("game.pot.chips"), None);
    }

    #[test]
    fn test_increment_from_absent_and_existing() {
        let (mut state, player, mut rng) = fixture();
        let path = format!("players.{player}.score");
        let op = StateDeltaOp::Increment {
            path: path.clone(),
            amount: 2.0,
        };
        apply(&mut state, &[op.clone()], &mut rng).unwrap();
        assert_eq!(state.get_path(&path), Some(&json!(2)));
        apply(&mut state, &[op], &mut rng).unwrap();
        assert_eq!(state.get_path(&path), Some(&json!(4)));
    }

    #[test]
    fn test_increment_rejects_non_numeric_leaf() {
        let (mut state, _, mut rng) = fixture();
        state.set_path("game.name", json!("poker")).unwrap();
        let result = apply(
            &mut state,
            &[StateDeltaOp::Increment {
                path: "game.name".into(),
                amount: 1.0,
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
    }

    #[test]
    fn test_append_creates_array() {
        let (mut state, _, mut rng) = fixture();
        let op = |value: Value| StateDeltaOp::Append {
            path: "game.log".into(),
            value,
        };
        apply(&mut state, &[op(json!("a")), op(json!("b"))], &mut rng).unwrap();
        assert_eq!(state.get_path("game.log"), Some(&json!(["a", "b"])));

        state.set_path("game.round", json!(1)).unwrap();
        let result = apply(
            &mut state,
            &[StateDeltaOp::Append {
                path: "game.round".into(),
                value: json!("x"),
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
    }

    #[test]
    fn test_transfer_moves_amount() {
        let (mut state, player, mut rng) = fixture();
        let chips = format!("players.{player}.chips");
        state.set_path(&chips, json!(100)).unwrap();
        state.set_path("game.pot", json!(10)).unwrap();

        apply(
            &mut state,
            &[StateDeltaOp::Transfer {
                from_path: chips.clone(),
                to_path: "game.pot".into(),
                amount: 25.0,
            }],
            &mut rng,
        )
        .unwrap();
        assert_eq!(state.get_path(&chips), Some(&json!(75)));
        assert_eq!(state.get_path("game.pot"), Some(&json!(35)));
    }

    #[test]
    fn test_transfer_is_atomic_on_mismatch() {
        let (mut state, _, mut rng) = fixture();
        state.set_path("game.pot", json!(10)).unwrap();
        state.set_path("game.label", json!("pot")).unwrap();

        let result = apply(
            &mut state,
            &[StateDeltaOp::Transfer {
                from_path: "game.pot".into(),
                to_path: "game.label".into(),
                amount: 5.0,
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
        // The source leaf must not have been decremented.
        assert_eq!(state.get_path("game.pot"), Some(&json!(10)));
    }

    #[test]
    fn test_merge_preserves_unmentioned_keys() {
        let (mut state, _, mut rng) = fixture();
        state
            .set_path("game.settings", json!({"speed": "fast", "rounds": 3}))
            .unwrap();
        apply(
            &mut state,
            &[StateDeltaOp::Merge {
                path: "game.settings".into(),
                value: json!({"rounds": 5, "mode": "ranked"}),
            }],
            &mut rng,
        )
        .unwrap();
        assert_eq!(
            state.get_path("game.settings"),
            Some(&json!({"speed": "fast", "rounds": 5, "mode": "ranked"}))
        );
    }

    #[test]
    fn test_merge_rejects_non_object_sides() {
        let (mut state, _, mut rng) = fixture();
        state.set_path("game.count", json!(3)).unwrap();

        // Existing leaf is not an object.
        let result = apply(
            &mut state,
            &[StateDeltaOp::Merge {
                path: "game.count".into(),
                value: json!({"a": 1}),
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
        assert_eq!(state.get_path("game.count"), Some(&json!(3)));

        // Incoming value is not an object.
        let result = apply(
            &mut state,
            &[StateDeltaOp::Merge {
                path: "game.settings".into(),
                value: json!(5),
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::TypeMismatch { .. })));
        assert_eq!(state.get_path("game.settings"), None);
    }

    #[test]
    fn test_ops_apply_in_order_within_batch() {
        let (mut state, _, mut rng) = fixture();
        let ops = vec![
            StateDeltaOp::Set {
                path: "game.count".into(),
                value: json!(10),
            },
            StateDeltaOp::Increment {
                path: "game.count".into(),
                amount: 5.0,
            },
        ];
        apply(&mut state, &ops, &mut rng).unwrap();
        assert_eq!(state.get_path("game.count"), Some(&json!(15)));
    }

    #[test]
    fn test_rng_writes_one_of_choices_and_never_redraws() {
        let (mut state, _, mut rng) = fixture();
        apply(
            &mut state,
            &[StateDeltaOp::Rng {
                path: "game.coin".into(),
                choices: vec![json!("heads"), json!("tails")],
                probabilities: vec![1.0, 0.0],
            }],
            &mut rng,
        )
        .unwrap();
        assert_eq!(state.get_path("game.coin"), Some(&json!("heads")));

        // The written value is the record of the draw: re-reading state is
        // just a read, nothing can re-roll it.
        let snapshot = state.clone();
        assert_eq!(snapshot.get_path("game.coin"), state.get_path("game.coin"));
    }

    #[test]
    fn test_rng_rejects_bad_distributions() {
        let (mut state, _, mut rng) = fixture();
        let result = apply(
            &mut state,
            &[StateDeltaOp::Rng {
                path: "game.coin".into(),
                choices: vec![json!("heads"), json!("tails")],
                probabilities: vec![0.5],
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::BadRngSpec { .. })));

        let result = apply(
            &mut state,
            &[StateDeltaOp::Rng {
                path: "game.coin".into(),
                choices: vec![json!("heads"), json!("tails")],
                probabilities: vec![0.7, 0.7],
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::BadRngSpec { .. })));
    }

    #[test]
    fn test_unresolved_template_is_rejected() {
        let (mut state, _, mut rng) = fixture();
        let result = apply(
            &mut state,
            &[StateDeltaOp::Set {
                path: "players.{{player1id}}.score".into(),
                value: json!(1),
            }],
            &mut rng,
        );
        assert!(matches!(result, Err(EngineError::TemplateUnresolved { .. })));
    }
}
