//! Expression evaluation over a game-state context.
//!
//! Evaluation is pure and total: a parsed expression never panics and never
//! errors. Lookups of absent paths yield `Null`, arithmetic on non-numbers
//! yields `Null`, and truthiness follows JSON-logic conventions.

use game_artifacts::{descend_map, GameState, PlayerId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{ArithOp, CompareOp, Expr, PlayerTest};

/// Computed context field: the number of players in the session.
pub const PLAYER_COUNT: &str = "playerCount";

/// The data an expression evaluates against: the state tree plus the
/// pending player action, if any.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub game: &'a Map<String, Value>,
    pub players: &'a BTreeMap<PlayerId, Map<String, Value>>,
    pub input: Option<&'a Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(state: &'a GameState, input: Option<&'a Value>) -> Self {
        Self {
            game: &state.game,
            players: &state.players,
            input,
        }
    }

    /// Resolve a dot-path against the context. `game.*`, `players.<id>.*`,
    /// `input.*`, and the computed `playerCount` are addressable.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if path == PLAYER_COUNT {
            return None; // handled in resolve(), needs an owned number
        }
        let (root, rest) = path.split_once('.').unwrap_or((path, ""));
        match root {
            "game" => {
                let segments: Vec<&str> = rest.split('.').collect();
                descend_map(self.game, &segments)
            }
            "players" => {
                let (id_segment, field) = rest.split_once('.')?;
                let id = PlayerId::parse(id_segment)?;
                let segments: Vec<&str> = field.split('.').collect();
                descend_map(self.players.get(&id)?, &segments)
            }
            "input" => {
                let input = self.input?;
                if rest.is_empty() {
                    return Some(input);
                }
                let mut current = input;
                for segment in rest.split('.') {
                    current = match current {
                        Value::Object(inner) => inner.get(segment)?,
                        Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                        _ => return None,
                    };
                }
                Some(current)
            }
            _ => None,
        }
    }

    fn resolve(&self, path: &str) -> Option<Value> {
        if path == PLAYER_COUNT {
            return Some(Value::from(self.players.len() as u64));
        }
        self.lookup(path).cloned()
    }
}

/// Evaluate an expression to its value.
pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Var { path, default } => ctx
            .resolve(path)
            .or_else(|| default.clone())
            .unwrap_or(Value::Null),
        Expr::Missing(paths) => Value::Array(
            paths
                .iter()
                .filter(|path| ctx.resolve(path).is_none())
                .map(|path| Value::String(path.clone()))
                .collect(),
        ),
        Expr::Not(inner) => Value::Bool(!evaluate_bool(inner, ctx)),
        Expr::And(items) => {
            let mut last = Value::Bool(true);
            for item in items {
                last = evaluate(item, ctx);
                if !truthy(&last) {
                    return last;
                }
            }
            last
        }
        Expr::Or(items) => {
            let mut last = Value::Bool(false);
            for item in items {
                last = evaluate(item, ctx);
                if truthy(&last) {
                    return last;
                }
            }
            last
        }
        Expr::If(items) => {
            let mut chunks = items.chunks_exact(2);
            for pair in chunks.by_ref() {
                if evaluate_bool(&pair[0], ctx) {
                    return evaluate(&pair[1], ctx);
                }
            }
            match chunks.remainder() {
                [fallback] => evaluate(fallback, ctx),
                _ => Value::Null,
            }
        }
        Expr::Compare(op, operands) => {
            let values: Vec<Value> = operands.iter().map(|o| evaluate(o, ctx)).collect();
            Value::Bool(values.windows(2).all(|pair| compare(*op, &pair[0], &pair[1])))
        }
        Expr::Arith(op, operands) => {
            let values: Vec<Value> = operands.iter().map(|o| evaluate(o, ctx)).collect();
            arithmetic(*op, &values)
        }
        Expr::In(needle, haystack) => {
            let needle = evaluate(needle, ctx);
            let haystack = evaluate(haystack, ctx);
            Value::Bool(contains(&haystack, &needle))
        }
        Expr::AllPlayers(test) => {
            Value::Bool(ctx.players.values().all(|record| player_test(test, record)))
        }
        Expr::AnyPlayer(test) => {
            Value::Bool(ctx.players.values().any(|record| player_test(test, record)))
        }
    }
}

/// Evaluate an expression as a boolean guard.
pub fn evaluate_bool(expr: &Expr, ctx: &EvalContext<'_>) -> bool {
    truthy(&evaluate(expr, ctx))
}

/// JSON-logic truthiness: empty strings/arrays, zero, and null are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Apply a comparison. Numbers compare numerically, strings
/// lexicographically; ordering anything else is false.
pub fn compare(op: CompareOp, a: &Value, b: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_eq(a, b),
        CompareOp::Ne => !loose_eq(a, b),
        _ => {
            let ordering = if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                x.partial_cmp(&y)
            } else if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
                Some(x.cmp(y))
            } else {
                None
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                CompareOp::Ge => ordering.is_ge(),
                CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
            }
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x == y;
    }
    a == b
}

fn player_test(test: &PlayerTest, record: &Map<String, Value>) -> bool {
    let segments: Vec<&str> = test.field.split('.').collect();
    let field = descend_map(record, &segments).unwrap_or(&Value::Null);
    compare(test.op, field, &test.value)
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        _ => false,
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        _ => None,
    }
}

fn arithmetic(op: ArithOp, values: &[Value]) -> Value {
    let mut numbers = Vec::with_capacity(values.len());
    for value in values {
        match to_number(value) {
            Some(n) => numbers.push(n),
            None => return Value::Null,
        }
    }
    let result = match (op, numbers.as_slice()) {
        (ArithOp::Add, items) => items.iter().sum(),
        (ArithOp::Mul, items) => items.iter().product(),
        (ArithOp::Sub, [only]) => -only,
        (ArithOp::Sub, [a, b]) => a - b,
        (ArithOp::Div, [a, b]) if *b != 0.0 => a / b,
        (ArithOp::Mod, [a, b]) if *b != 0.0 => a % b,
        _ => return Value::Null,
    };
    number_value(result)
}

/// Prefer integer JSON numbers when the result is integral.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}
