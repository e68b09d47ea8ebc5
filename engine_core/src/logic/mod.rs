//! Precondition logic - a closed expression language over the state tree.
//!
//! Preconditions arrive as JSON-logic-style trees. Rather than embedding a
//! general expression engine, this module parses each tree once, at artifact
//! load, into a small recursive [`Expr`] over a strict operator allow-list,
//! and rejects anything outside it. Two domain quantifiers (`allPlayers`,
//! `anyPlayer`) range over the player map so preconditions never hard-code a
//! player id or array index; literal indexed access into `players` is a
//! parse error pointing authors at the quantifiers.

mod eval;

pub use eval::*;

use serde_json::Value;
use thiserror::Error;

/// Parse-time rejection of an expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogicError {
    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),
    #[error("operator '{op}' expects {expected} arguments, got {got}")]
    Arity {
        op: String,
        expected: &'static str,
        got: usize,
    },
    #[error("expression node must be an object with a single operator key")]
    MalformedNode,
    #[error("'var' path must be a string")]
    BadVarPath,
    #[error("indexed access into the player map ('{0}') is not allowed; use allPlayers/anyPlayer")]
    IndexedPlayerAccess(String),
    #[error("'{0}' is not a comparison operator")]
    NotAComparison(String),
}

/// A comparison operator usable standalone or inside a quantifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// An arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// The comparison inside an `allPlayers`/`anyPlayer` quantifier: the named
/// player field is compared against a literal value for each player record.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerTest {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

/// A parsed precondition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var {
        path: String,
        default: Option<Value>,
    },
    Missing(Vec<String>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// Condition/branch pairs with an optional trailing else.
    If(Vec<Expr>),
    Compare(CompareOp, Vec<Expr>),
    Arith(ArithOp, Vec<Expr>),
    In(Box<Expr>, Box<Expr>),
    AllPlayers(PlayerTest),
    AnyPlayer(PlayerTest),
}

impl Expr {
    /// Parse a JSON-logic-style tree, enforcing the operator allow-list.
    pub fn parse(node: &Value) -> Result<Self, LogicError> {
        match node {
            Value::Object(map) => {
                if map.len() != 1 {
                    return Err(LogicError::MalformedNode);
                }
                let (operator, body) = map.iter().next().expect("len checked above");
                parse_operator(operator, body)
            }
            // Everything that is not an operator node is a literal.
            other => Ok(Expr::Literal(other.clone())),
        }
    }

    /// Collect every referenced path: `vars` receives raw `var`/`missing`
    /// paths, `player_fields` the (already player-relative) quantifier
    /// fields.
    pub fn collect_refs(&self, vars: &mut Vec<String>, player_fields: &mut Vec<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Var { path, .. } => vars.push(path.clone()),
            Expr::Missing(paths) => vars.extend(paths.iter().cloned()),
            Expr::Not(inner) => inner.collect_refs(vars, player_fields),
            Expr::And(items) | Expr::Or(items) | Expr::If(items) => {
                for item in items {
                    item.collect_refs(vars, player_fields);
                }
            }
            Expr::Compare(_, operands) | Expr::Arith(_, operands) => {
                for operand in operands {
                    operand.collect_refs(vars, player_fields);
                }
            }
            Expr::In(needle, haystack) => {
                needle.collect_refs(vars, player_fields);
                haystack.collect_refs(vars, player_fields);
            }
            Expr::AllPlayers(test) | Expr::AnyPlayer(test) => {
                player_fields.push(test.field.clone());
            }
        }
    }
}

fn parse_operator(operator: &str, body: &Value) -> Result<Expr, LogicError> {
    let args = args_of(body);
    match operator {
        "var" => parse_var(&args),
        "missing" => {
            let mut paths = Vec::with_capacity(args.len());
            for arg in &args {
                let path = arg.as_str().ok_or(LogicError::BadVarPath)?;
                reject_player_index(path)?;
                paths.push(path.to_string());
            }
            Ok(Expr::Missing(paths))
        }
        "not" => {
            let [arg] = exact::<1>(operator, &args)?;
            Ok(Expr::Not(Box::new(Expr::parse(arg)?)))
        }
        "and" => Ok(Expr::And(parse_all(operator, &args, 1)?)),
        "or" => Ok(Expr::Or(parse_all(operator, &args, 1)?)),
        "if" => Ok(Expr::If(parse_all(operator, &args, 2)?)),
        "==" | "!=" | "<" | "<=" | ">" | ">=" => {
            let op = CompareOp::parse(operator).expect("matched above");
            Ok(Expr::Compare(op, parse_all(operator, &args, 2)?))
        }
        "+" => Ok(Expr::Arith(ArithOp::Add, parse_all(operator, &args, 1)?)),
        "*" => Ok(Expr::Arith(ArithOp::Mul, parse_all(operator, &args, 1)?)),
        "-" => {
            if args.is_empty() || args.len() > 2 {
                return Err(arity(operator, "1 or 2", args.len()));
            }
            Ok(Expr::Arith(ArithOp::Sub, parse_all(operator, &args, 1)?))
        }
        "/" => {
            exact::<2>(operator, &args)?;
            Ok(Expr::Arith(ArithOp::Div, parse_all(operator, &args, 2)?))
        }
        "%" => {
            exact::<2>(operator, &args)?;
            Ok(Expr::Arith(ArithOp::Mod, parse_all(operator, &args, 2)?))
        }
        "in" => {
            let [needle, haystack] = exact::<2>(operator, &args)?;
            Ok(Expr::In(
                Box::new(Expr::parse(needle)?),
                Box::new(Expr::parse(haystack)?),
            ))
        }
        "allPlayers" => Ok(Expr::AllPlayers(parse_player_test(operator, &args)?)),
        "anyPlayer" => Ok(Expr::AnyPlayer(parse_player_test(operator, &args)?)),
        other => Err(LogicError::UnsupportedOperator(other.to_string())),
    }
}

fn parse_var(args: &[&Value]) -> Result<Expr, LogicError> {
    if args.is_empty() || args.len() > 2 {
        return Err(arity("var", "1 or 2", args.len()));
    }
    let path = args[0].as_str().ok_or(LogicError::BadVarPath)?;
    reject_player_index(path)?;
    Ok(Expr::Var {
        path: path.to_string(),
        default: args.get(1).map(|v| (*v).clone()),
    })
}

fn parse_player_test(operator: &str, args: &[&Value]) -> Result<PlayerTest, LogicError> {
    let [field, op, value] = exact::<3>(operator, args)?;
    let field = field.as_str().ok_or(LogicError::BadVarPath)?;
    let op_symbol = op.as_str().ok_or(LogicError::MalformedNode)?;
    let op = CompareOp::parse(op_symbol)
        .ok_or_else(|| LogicError::NotAComparison(op_symbol.to_string()))?;
    Ok(PlayerTest {
        field: field.to_string(),
        op,
        value: (*value).clone(),
    })
}

/// `players[0].score` and `players.0.score` hard-code a player slot; the
/// quantifiers stay correct regardless of player count.
fn reject_player_index(path: &str) -> Result<(), LogicError> {
    if let Some(rest) = path.strip_prefix("players") {
        let indexed = if let Some(bracketed) = rest.strip_prefix('[') {
            bracketed.chars().next().is_some_and(|c| c.is_ascii_digit())
        } else if let Some(dotted) = rest.strip_prefix('.') {
            let segment = dotted.split(['.', '[']).next().unwrap_or("");
            !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit())
        } else {
            false
        };
        if indexed {
            return Err(LogicError::IndexedPlayerAccess(path.to_string()));
        }
    }
    Ok(())
}

/// Operator arguments: an array is an argument list, anything else a single
/// argument.
fn args_of(body: &Value) -> Vec<&Value> {
    match body {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

fn parse_all(operator: &str, args: &[&Value], min: usize) -> Result<Vec<Expr>, LogicError> {
    if args.len() < min {
        return Err(arity(operator, "more", args.len()));
    }
    args.iter().map(|arg| Expr::parse(arg)).collect()
}

fn exact<'a, const N: usize>(
    operator: &str,
    args: &[&'a Value],
) -> Result<[&'a Value; N], LogicError> {
    let expected = match N {
        1 => "1",
        2 => "2",
        3 => "3",
        _ => "several",
    };
    <[&Value; N]>::try_from(args).map_err(|_| arity(operator, expected, args.len()))
}

fn arity(op: &str, expected: &'static str, got: usize) -> LogicError {
    LogicError::Arity {
        op: op.to_string(),
        expected,
        got,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_comparison() {
        let expr = Expr::parse(&json!({"==": [{"var": "game.round"}, 3]})).unwrap();
        match expr {
            Expr::Compare(CompareOp::Eq, operands) => {
                assert_eq!(operands.len(), 2);
                assert_eq!(
                    operands[0],
                    Expr::Var {
                        path: "game.round".into(),
                        default: None
                    }
                );
            }
            other => panic!("unexpected expr {other:?}"),
        }
    }

    #[test]
    fn test_parse_var_with_default() {
        let expr = Expr::parse(&json!({"var": ["game.pot", 0]})).unwrap();
        assert_eq!(
            expr,
            Expr::Var {
                path: "game.pot".into(),
                default: Some(json!(0)),
            }
        );
    }

    #[test]
    fn test_parse_quantifier() {
        let expr = Expr::parse(&json!({"allPlayers": ["actionRequired", "==", false]})).unwrap();
        assert_eq!(
            expr,
            Expr::AllPlayers(PlayerTest {
                field: "actionRequired".into(),
                op: CompareOp::Eq,
                value: json!(false),
            })
        );
    }

    #[test]
    fn test_quantifier_requires_comparison_op() {
        let result = Expr::parse(&json!({"anyPlayer": ["score", "and", 1]}));
        assert_eq!(result, Err(LogicError::NotAComparison("and".into())));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let result = Expr::parse(&json!({"map": [[1, 2], {"var": ""}]}));
        assert_eq!(result, Err(LogicError::UnsupportedOperator("map".into())));
    }

    #[test]
    fn test_indexed_player_access_is_rejected() {
        for path in ["players[0].score", "players.0.score", "players.2"] {
            let result = Expr::parse(&json!({"var": path}));
            assert_eq!(
                result,
                Err(LogicError::IndexedPlayerAccess(path.into())),
                "path {path} should be rejected"
            );
        }
        // Named segments stay legal.
        assert!(Expr::parse(&json!({"var": "players.player1.score"})).is_ok());
        assert!(Expr::parse(&json!({"var": "game.history.0"})).is_ok());
    }

    #[test]
    fn test_multi_key_node_is_malformed() {
        let result = Expr::parse(&json!({"==": [1, 1], "!=": [1, 2]}));
        assert_eq!(result, Err(LogicError::MalformedNode));
    }

    #[test]
    fn test_collect_refs() {
        let expr = Expr::parse(&json!({
            "and": [
                {"==": [{"var": "game.round"}, {"var": "game.maxRounds"}]},
                {"allPlayers": ["score", ">=", 0]},
                {"missing": ["game.winner"]}
            ]
        }))
        .unwrap();
        let mut vars = Vec::new();
        let mut player_fields = Vec::new();
        expr.collect_refs(&mut vars, &mut player_fields);
        assert_eq!(vars, vec!["game.round", "game.maxRounds", "game.winner"]);
        assert_eq!(player_fields, vec!["score"]);
    }

    #[test]
    fn test_literal_arrays_pass_through() {
        let expr = Expr::parse(&json!({"in": [{"var": "input.move"}, ["rock", "paper"]]})).unwrap();
        match expr {
            Expr::In(_, haystack) => {
                assert_eq!(*haystack, Expr::Literal(json!(["rock", "paper"])));
            }
            other => panic!("unexpected expr {other:?}"),
        }
    }
}
