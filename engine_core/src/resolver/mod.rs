//! Player-template resolver - rewrites positional player placeholders into
//! concrete session player ids.
//!
//! Artifacts reference players positionally (`{{player1id}}`, `{{p2id}}`,
//! path segments `players.p1.`) so the generator never needs real ids.
//! Templates are compiled once into a small IR of literal and placeholder
//! segments, then substituted at session-build time; afterwards every path
//! in play is concrete, which the delta engine treats as an invariant.

use game_artifacts::{Instruction, InstructionSet, PlayerId, TransitionsArtifact};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::EngineError;

/// Positional alias -> concrete player id, built once per session from the
/// ordered player list and immutable for the session lifetime.
#[derive(Debug, Clone)]
pub struct PlayerMapping {
    by_alias: BTreeMap<String, PlayerId>,
    order: Vec<PlayerId>,
}

impl PlayerMapping {
    /// Build the mapping: the first player becomes `player1`, and so on.
    pub fn from_ordered(ids: &[PlayerId]) -> Self {
        let mut by_alias = BTreeMap::new();
        for (index, id) in ids.iter().enumerate() {
            by_alias.insert(format!("player{}", index + 1), *id);
        }
        Self {
            by_alias,
            order: ids.to_vec(),
        }
    }

    /// Look up a canonical alias (`player<N>`).
    pub fn lookup(&self, alias: &str) -> Option<PlayerId> {
        self.by_alias.get(alias).copied()
    }

    fn lookup_position(&self, position: u32) -> Option<PlayerId> {
        self.lookup(&format!("player{position}"))
    }

    /// Player ids in seating order.
    pub fn ids(&self) -> &[PlayerId] {
        &self.order
    }

    pub fn player_count(&self) -> usize {
        self.order.len()
    }
}

/// One piece of a compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// A positional player reference (1-based).
    Player(u32),
}

/// A template string compiled into literal and placeholder segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Compile a string. Parsing is total: unrecognized `{{...}}` tokens and
    /// ordinary text stay literal.
    pub fn parse(input: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = input;
        while let Some(open) = rest.find("{{") {
            let (before, tail) = rest.split_at(open);
            match tail.find("}}") {
                Some(close) => {
                    let token = &tail[2..close];
                    match parse_placeholder(token) {
                        Some(position) => {
                            push_literal(&mut segments, before);
                            segments.push(Segment::Player(position));
                        }
                        None => {
                            // Not a player placeholder: keep the braces as-is.
                            push_literal(&mut segments, before);
                            push_literal(&mut segments, &tail[..close + 2]);
                        }
                    }
                    rest = &tail[close + 2..];
                }
                None => break,
            }
        }
        push_literal(&mut segments, rest);
        Self { segments }
    }

    /// Whether the template carries no player placeholders.
    pub fn is_concrete(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Produce the concrete string for this session's players.
    pub fn substitute(&self, mapping: &PlayerMapping) -> Result<String, EngineError> {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Player(position) => {
                    let id = mapping.lookup_position(*position).ok_or_else(|| {
                        EngineError::UnknownPlayer {
                            alias: format!("player{position}"),
                        }
                    })?;
                    output.push_str(&id.to_string());
                }
            }
        }
        Ok(output)
    }
}

/// Push literal text, expanding bare `players.p<N>.` path segments into
/// player placeholders.
fn push_literal(segments: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    let parts: Vec<&str> = text.split('.').collect();
    let mut literal = String::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            literal.push('.');
        }
        let follows_players = index > 0 && parts[index - 1].eq_ignore_ascii_case("players");
        if follows_players {
            if let Some(position) = parse_alias(part) {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
                segments.push(Segment::Player(position));
                continue;
            }
        }
        literal.push_str(part);
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
}

/// `{{p<N>id}}` / `{{player<N>id}}`, case-insensitive.
fn parse_placeholder(token: &str) -> Option<u32> {
    let lowered = token.trim().to_ascii_lowercase();
    let core = lowered.strip_suffix("id")?;
    parse_alias(core)
}

/// `p<N>` / `player<N>`, case-insensitive.
fn parse_alias(segment: &str) -> Option<u32> {
    let lowered = segment.to_ascii_lowercase();
    let digits = lowered
        .strip_prefix("player")
        .or_else(|| lowered.strip_prefix('p'))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Rewrite every string in a value tree, leaving non-template content
/// untouched. Resolution is idempotent: a concrete tree passes through
/// unchanged.
pub fn resolve_value(value: &Value, mapping: &PlayerMapping) -> Result<Value, EngineError> {
    match value {
        Value::String(text) => {
            let template = PathTemplate::parse(text);
            if template.is_concrete() {
                Ok(value.clone())
            } else {
                Ok(Value::String(template.substitute(mapping)?))
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, mapping))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(entries) => {
            let mut resolved = Map::new();
            for (key, item) in entries {
                let key = match resolve_value(&Value::String(key.clone()), mapping)? {
                    Value::String(key) => key,
                    _ => key.clone(),
                };
                resolved.insert(key, resolve_value(item, mapping)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve one instruction payload (stateDelta paths, values, checks,
/// message templates).
pub fn resolve_instruction(
    instruction: &Instruction,
    mapping: &PlayerMapping,
) -> Result<Instruction, EngineError> {
    reshape(instruction, mapping)
}

/// Resolve every instruction in an artifact set.
pub fn resolve_instruction_set(
    set: &InstructionSet,
    mapping: &PlayerMapping,
) -> Result<InstructionSet, EngineError> {
    reshape(set, mapping)
}

/// Resolve positional references inside transition preconditions and
/// checked-field lists.
pub fn resolve_transitions(
    artifact: &TransitionsArtifact,
    mapping: &PlayerMapping,
) -> Result<TransitionsArtifact, EngineError> {
    reshape(artifact, mapping)
}

fn reshape<T>(value: &T, mapping: &PlayerMapping) -> Result<T, EngineError>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    let raw = serde_json::to_value(value).map_err(|err| EngineError::TemplateUnresolved {
        path: err.to_string(),
    })?;
    let resolved = resolve_value(&raw, mapping)?;
    serde_json::from_value(resolved).map_err(|err| EngineError::TemplateUnresolved {
        path: err.to_string(),
    })
}
