//! State schema - the declared shape of `game.*` and `players.<id>.*` fields.
//!
//! The artifact-generation collaborator emits a JSON-Schema-like document;
//! this module flattens it into declared dot-paths (for the validator's
//! field-reference checks) and per-field defaults (for initial state).

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::state::{
    ACTIONS_ALLOWED, ACTION_REQUIRED, CURRENT_ACTION, CURRENT_PHASE, GAME_ENDED, GAME_ERROR,
    ILLEGAL_ACTION_COUNT, PRIVATE_MESSAGE,
};

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "integer" => Some(FieldType::Integer),
            "boolean" => Some(FieldType::Boolean),
            "array" => Some(FieldType::Array),
            "object" => Some(FieldType::Object),
            _ => None,
        }
    }

    /// The zero value a field of this type starts at when the schema gives
    /// no explicit default.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Number | FieldType::Integer => Value::from(0),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Array => Value::Array(Vec::new()),
            FieldType::Object => Value::Object(Map::new()),
        }
    }
}

/// A single declared field, possibly with nested object properties.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub default: Option<Value>,
    /// Nested properties for object fields. An object with no declared
    /// properties accepts any suffix path.
    pub properties: BTreeMap<String, FieldSpec>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            default: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    fn initial_value(&self) -> Value {
        self.default
            .clone()
            .unwrap_or_else(|| self.field_type.zero_value())
    }
}

/// Errors raised while parsing a schema document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema document must be an object")]
    NotAnObject,
    #[error("schema field '{field}' has unknown type '{type_name}'")]
    UnknownType { field: String, type_name: String },
    #[error("schema field '{0}' is missing a type")]
    MissingType(String),
}

/// The declared state shape for one game.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateSchema {
    pub game: BTreeMap<String, FieldSpec>,
    pub players: BTreeMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_game_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.game.insert(name.into(), spec);
        self
    }

    pub fn with_player_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.players.insert(name.into(), spec);
        self
    }

    /// Parse the collaborator's schema document. Top-level keys `gameState`
    /// and `playerState` each hold a `properties` map (a bare properties map
    /// is also accepted).
    pub fn from_value(document: &Value) -> Result<Self, SchemaError> {
        let document = document.as_object().ok_or(SchemaError::NotAnObject)?;
        let mut schema = StateSchema::new();
        if let Some(section) = document.get("gameState").or_else(|| document.get("game")) {
            schema.game = parse_section(section)?;
        }
        if let Some(section) = document.get("playerState").or_else(|| document.get("players")) {
            schema.players = parse_section(section)?;
        }
        Ok(schema)
    }

    /// All declared dot-paths (`game.pot`, `players.score`, nested object
    /// properties recursively), plus the reserved fields every game carries.
    pub fn declared_paths(&self) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        for name in reserved_game_fields() {
            paths.insert(format!("game.{name}"));
        }
        for name in reserved_player_fields() {
            paths.insert(format!("players.{name}"));
        }
        for (name, spec) in &self.game {
            collect_paths(&format!("game.{name}"), spec, &mut paths);
        }
        for (name, spec) in &self.players {
            collect_paths(&format!("players.{name}"), spec, &mut paths);
        }
        paths
    }

    /// Whether a normalized dot-path is legal: it is declared outright, or
    /// it extends a declared object field with no fixed properties.
    pub fn is_declared(&self, path: &str) -> bool {
        let (section, rest) = match path.split_once('.') {
            Some(split) => split,
            None => return false,
        };
        let fields = match section {
            "game" => &self.game,
            "players" => &self.players,
            _ => return false,
        };
        let reserved: &[&str] = match section {
            "game" => reserved_game_fields(),
            _ => reserved_player_fields(),
        };
        let head = rest.split('.').next().unwrap_or(rest);
        if reserved.contains(&head) {
            // Scalar reserved fields accept no sub-paths; only the
            // object-shaped ones stay open below their root.
            return rest == head || open_reserved_fields().contains(&head);
        }
        is_declared_in(fields, rest)
    }

    /// The initial game record: reserved fields plus every declared field at
    /// its default (or zero) value.
    pub fn default_game_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        record.insert(CURRENT_PHASE.to_string(), Value::String(String::new()));
        record.insert(GAME_ENDED.to_string(), Value::Bool(false));
        for (name, spec) in &self.game {
            record.insert(name.clone(), spec.initial_value());
        }
        record
    }

    /// The declared (non-reserved) player fields at their default values.
    /// Reserved player fields are filled in by [`crate::GameState::add_player`].
    pub fn default_player_record(&self) -> Map<String, Value> {
        let mut record = Map::new();
        for (name, spec) in &self.players {
            record.insert(name.clone(), spec.initial_value());
        }
        record
    }
}

fn reserved_game_fields() -> &'static [&'static str] {
    &[CURRENT_PHASE, GAME_ENDED, GAME_ERROR]
}

fn reserved_player_fields() -> &'static [&'static str] {
    &[
        ACTION_REQUIRED,
        ACTIONS_ALLOWED,
        ILLEGAL_ACTION_COUNT,
        PRIVATE_MESSAGE,
        CURRENT_ACTION,
    ]
}

/// Reserved fields holding objects rather than scalars.
fn open_reserved_fields() -> &'static [&'static str] {
    &[GAME_ERROR, CURRENT_ACTION]
}

fn parse_section(section: &Value) -> Result<BTreeMap<String, FieldSpec>, SchemaError> {
    let section = section.as_object().ok_or(SchemaError::NotAnObject)?;
    let properties = match section.get("properties") {
        Some(props) => props.as_object().ok_or(SchemaError::NotAnObject)?,
        None => section,
    };
    let mut fields = BTreeMap::new();
    for (name, body) in properties {
        fields.insert(name.clone(), parse_field(name, body)?);
    }
    Ok(fields)
}

fn parse_field(name: &str, body: &Value) -> Result<FieldSpec, SchemaError> {
    let body = body.as_object().ok_or(SchemaError::NotAnObject)?;
    let type_name = body
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::MissingType(name.to_string()))?;
    let field_type = FieldType::parse(type_name).ok_or_else(|| SchemaError::UnknownType {
        field: name.to_string(),
        type_name: type_name.to_string(),
    })?;
    let mut spec = FieldSpec::new(field_type);
    spec.default = body.get("default").cloned();
    if let Some(Value::Object(properties)) = body.get("properties") {
        for (child, child_body) in properties {
            spec.properties
                .insert(child.clone(), parse_field(child, child_body)?);
        }
    }
    Ok(spec)
}

fn collect_paths(prefix: &str, spec: &FieldSpec, paths: &mut BTreeSet<String>) {
    paths.insert(prefix.to_string());
    for (name, child) in &spec.properties {
        collect_paths(&format!("{prefix}.{name}"), child, paths);
    }
}

fn is_declared_in(fields: &BTreeMap<String, FieldSpec>, path: &str) -> bool {
    let (head, rest) = match path.split_once('.') {
        Some(split) => split,
        None => return fields.contains_key(path),
    };
    match fields.get(head) {
        Some(spec) if spec.field_type == FieldType::Object && spec.properties.is_empty() => true,
        Some(spec) => is_declared_in(&spec.properties, rest),
        None => false,
    }
}
