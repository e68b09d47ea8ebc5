//! Game state tree - the central structure mutated by state deltas.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Reserved game-level field: name of the phase the session is currently in.
pub const CURRENT_PHASE: &str = "currentPhase";
/// Reserved game-level field: set once a terminal phase has been entered.
pub const GAME_ENDED: &str = "gameEnded";
/// Reserved game-level field: sticky error record, absent while healthy.
pub const GAME_ERROR: &str = "gameError";

/// Reserved player-level field: the player must act before play continues.
pub const ACTION_REQUIRED: &str = "actionRequired";
/// Reserved player-level field: whether actions are accepted (`null` = unset).
pub const ACTIONS_ALLOWED: &str = "actionsAllowed";
/// Reserved player-level field: count of rejected action submissions.
pub const ILLEGAL_ACTION_COUNT: &str = "illegalActionCount";
/// Reserved player-level field: last message addressed to this player only.
pub const PRIVATE_MESSAGE: &str = "privateMessage";
/// Reserved player-level field: the most recently accepted action payload.
pub const CURRENT_ACTION: &str = "currentAction";

/// Unique identifier for players within a game session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Create a new random player ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a player ID from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a player ID from a path segment.
    pub fn parse(segment: &str) -> Option<Self> {
        Uuid::parse_str(segment).ok().map(Self)
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recorded, sticky runtime error stored under `game.gameError`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameError {
    pub error_type: String,
    pub message: String,
}

/// Errors raised by dot-path navigation of the state tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("state path is empty")]
    Empty,
    #[error("state path '{0}' must start with 'game' or 'players'")]
    UnknownRoot(String),
    #[error("state path '{0}' names no player")]
    MissingPlayer(String),
    #[error("no player '{0}' in this session")]
    UnknownPlayer(String),
    #[error("segment '{segment}' of '{path}' is not an object")]
    NotAnObject { path: String, segment: String },
}

/// The complete state of a game session at any point in time.
///
/// `game` holds the shared record, `players` one record per player. Leaves
/// are untyped JSON values; the engine mutates them exclusively through
/// state-delta application and the reserved-field setters below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameState {
    /// Shared game-level fields, always including `currentPhase` and
    /// `gameEnded`.
    pub game: Map<String, Value>,

    /// Per-player records, keyed by session player ID.
    pub players: BTreeMap<PlayerId, Map<String, Value>>,
}

impl GameState {
    /// Create a new empty game state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase the session is currently in (empty string if unset).
    pub fn current_phase(&self) -> &str {
        self.game
            .get(CURRENT_PHASE)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn set_current_phase(&mut self, phase: &str) {
        self.game
            .insert(CURRENT_PHASE.to_string(), Value::String(phase.to_string()));
    }

    pub fn game_ended(&self) -> bool {
        self.game
            .get(GAME_ENDED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_game_ended(&mut self, ended: bool) {
        self.game.insert(GAME_ENDED.to_string(), Value::Bool(ended));
    }

    /// The recorded error, if the session has faulted.
    pub fn game_error(&self) -> Option<GameError> {
        self.game
            .get(GAME_ERROR)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Record a sticky error. The session halts until external intervention;
    /// the last good state plus error detail stays inspectable.
    pub fn record_error(&mut self, error_type: &str, message: impl Into<String>) {
        let error = GameError {
            error_type: error_type.to_string(),
            message: message.into(),
        };
        self.game.insert(
            GAME_ERROR.to_string(),
            serde_json::to_value(error).unwrap_or(Value::Null),
        );
    }

    /// Add a player with the default reserved fields plus `extra` overlaid.
    pub fn add_player(&mut self, id: PlayerId, extra: Map<String, Value>) {
        let mut record = Map::new();
        record.insert(ACTION_REQUIRED.to_string(), Value::Bool(false));
        record.insert(ACTIONS_ALLOWED.to_string(), Value::Null);
        record.insert(ILLEGAL_ACTION_COUNT.to_string(), Value::from(0));
        record.insert(PRIVATE_MESSAGE.to_string(), Value::String(String::new()));
        for (key, value) in extra {
            record.insert(key, value);
        }
        self.players.insert(id, record);
    }

    pub fn player(&self, id: PlayerId) -> Option<&Map<String, Value>> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Map<String, Value>> {
        self.players.get_mut(&id)
    }

    pub fn player_field(&self, id: PlayerId, field: &str) -> Option<&Value> {
        self.players.get(&id).and_then(|record| record.get(field))
    }

    pub fn set_player_field(&mut self, id: PlayerId, field: &str, value: Value) {
        if let Some(record) = self.players.get_mut(&id) {
            record.insert(field.to_string(), value);
        }
    }

    /// True if at least one player still has `actionRequired` set.
    pub fn any_player_action_required(&self) -> bool {
        self.players.values().any(|record| {
            record
                .get(ACTION_REQUIRED)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        })
    }

    /// Set every player's `actionRequired` flag at once.
    pub fn set_all_action_required(&mut self, required: bool) {
        for record in self.players.values_mut() {
            record.insert(ACTION_REQUIRED.to_string(), Value::Bool(required));
        }
    }

    /// Read the leaf at a concrete dot-path (`game.a.b` or
    /// `players.<id>.a.b`). Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let (root, segments) = split_root(path).ok()?;
        match root {
            Root::Game => descend_map(&self.game, &segments),
            Root::Player(id) => descend_map(self.players.get(&id)?, &segments),
        }
    }

    /// Write the leaf at a concrete dot-path, creating intermediate objects
    /// as needed.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<(), PathError> {
        let (root, segments) = split_root(path)?;
        let record = match root {
            Root::Game => &mut self.game,
            Root::Player(id) => self
                .players
                .get_mut(&id)
                .ok_or_else(|| PathError::UnknownPlayer(id.to_string()))?,
        };
        write_map(record, &segments, value, path)
    }

    /// Remove the leaf at a concrete dot-path. Returns the removed value;
    /// removing an absent leaf is a no-op yielding `None`.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let (root, segments) = split_root(path).ok()?;
        let record = match root {
            Root::Game => &mut self.game,
            Root::Player(id) => self.players.get_mut(&id)?,
        };
        remove_from_map(record, &segments)
    }
}

enum Root {
    Game,
    Player(PlayerId),
}

fn split_root(path: &str) -> Result<(Root, Vec<&str>), PathError> {
    let mut segments = path.split('.');
    let root = segments.next().filter(|s| !s.is_empty()).ok_or(PathError::Empty)?;
    let rest: Vec<&str> = segments.collect();
    match root {
        "game" => {
            if rest.is_empty() {
                return Err(PathError::Empty);
            }
            Ok((Root::Game, rest))
        }
        "players" => {
            let (id_segment, field_segments) =
                rest.split_first().ok_or_else(|| PathError::MissingPlayer(path.to_string()))?;
            let id = PlayerId::parse(id_segment)
                .ok_or_else(|| PathError::UnknownPlayer(id_segment.to_string()))?;
            if field_segments.is_empty() {
                return Err(PathError::MissingPlayer(path.to_string()));
            }
            Ok((Root::Player(id), field_segments.to_vec()))
        }
        _ => Err(PathError::UnknownRoot(path.to_string())),
    }
}

/// Walk nested objects (and arrays, via numeric segments) below a record.
pub fn descend_map<'a>(map: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = map.get(*first)?;
    for segment in rest {
        current = match current {
            Value::Object(inner) => inner.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn write_map(
    map: &mut Map<String, Value>,
    segments: &[&str],
    value: Value,
    full_path: &str,
) -> Result<(), PathError> {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Err(PathError::Empty),
    };
    if rest.is_empty() {
        map.insert(first.to_string(), value);
        return Ok(());
    }
    let slot = map
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    write_value(slot, rest, value, full_path)
}

fn write_value(
    slot: &mut Value,
    segments: &[&str],
    value: Value,
    full_path: &str,
) -> Result<(), PathError> {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => {
            *slot = value;
            return Ok(());
        }
    };
    match slot {
        Value::Object(inner) => {
            if rest.is_empty() {
                inner.insert(first.to_string(), value);
                Ok(())
            } else {
                let next = inner
                    .entry(first.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                write_value(next, rest, value, full_path)
            }
        }
        Value::Array(items) => {
            let index = first.parse::<usize>().map_err(|_| PathError::NotAnObject {
                path: full_path.to_string(),
                segment: first.to_string(),
            })?;
            let next = items.get_mut(index).ok_or_else(|| PathError::NotAnObject {
                path: full_path.to_string(),
                segment: first.to_string(),
            })?;
            write_value(next, rest, value, full_path)
        }
        _ => Err(PathError::NotAnObject {
            path: full_path.to_string(),
            segment: first.to_string(),
        }),
    }
}

fn remove_from_map(map: &mut Map<String, Value>, segments: &[&str]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    if rest.is_empty() {
        return map.remove(*first);
    }
    let (leaf, parents) = rest.split_last()?;
    let mut current = map.get_mut(*first)?;
    for segment in parents {
        current = match current {
            Value::Object(inner) => inner.get_mut(*segment)?,
            _ => return None,
        };
    }
    match current {
        Value::Object(inner) => inner.remove(*leaf),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_with_player() -> (GameState, PlayerId) {
        let mut state = GameState::new();
        state.set_current_phase("setup");
        state.set_game_ended(false);
        let id = PlayerId::new();
        state.add_player(id, Map::new());
        (state, id)
    }

    #[test]
    fn test_default_player_record() {
        let (state, id) = state_with_player();
        let record = state.player(id).unwrap();
        assert_eq!(record.get(ACTION_REQUIRED), Some(&json!(false)));
        assert_eq!(record.get(ACTIONS_ALLOWED), Some(&Value::Null));
        assert_eq!(record.get(ILLEGAL_ACTION_COUNT), Some(&json!(0)));
        assert_eq!(record.get(PRIVATE_MESSAGE), Some(&json!("")));
    }

    #[test]
    fn test_phase_accessors() {
        let (mut state, _) = state_with_player();
        assert_eq!(state.current_phase(), "setup");
        state.set_current_phase("playing");
        assert_eq!(state.current_phase(), "playing");
        assert!(!state.game_ended());
        state.set_game_ended(true);
        assert!(state.game_ended());
    }

    #[test]
    fn test_record_error_is_readable() {
        let (mut state, _) = state_with_player();
        assert!(state.game_error().is_none());

        state.record_error("deadlock", "no transition can fire");
        let error = state.game_error().unwrap();
        assert_eq!(error.error_type, "deadlock");
        assert_eq!(error.message, "no transition can fire");
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let (mut state, _) = state_with_player();
        state.set_path("game.pot.chips", json!(100)).unwrap();
        assert_eq!(state.get_path("game.pot.chips"), Some(&json!(100)));
        assert_eq!(state.get_path("game.pot"), Some(&json!({"chips": 100})));
    }

    #[test]
    fn test_player_path_round_trip() {
        let (mut state, id) = state_with_player();
        let path = format!("players.{id}.score");
        state.set_path(&path, json!(3)).unwrap();
        assert_eq!(state.get_path(&path), Some(&json!(3)));
        assert_eq!(state.player_field(id, "score"), Some(&json!(3)));
    }

    #[test]
    fn test_get_path_indexes_arrays() {
        let (mut state, _) = state_with_player();
        state.set_path("game.deck", json!(["ace", "king"])).unwrap();
        assert_eq!(state.get_path("game.deck.1"), Some(&json!("king")));
        assert_eq!(state.get_path("game.deck.2"), None);
    }

    #[test]
    fn test_remove_path_is_no_op_when_absent() {
        let (mut state, _) = state_with_player();
        state.set_path("game.round", json!(1)).unwrap();
        assert_eq!(state.remove_path("game.round"), Some(json!(1)));
        assert_eq!(state.remove_path("game.round"), None);
        assert_eq!(state.remove_path("game.never.there"), None);
    }

    #[test]
    fn test_set_path_rejects_bad_roots() {
        let (mut state, _) = state_with_player();
        assert!(matches!(
            state.set_path("board.x", json!(1)),
            Err(PathError::UnknownRoot(_))
        ));
        assert!(matches!(
            state.set_path("players.not-a-uuid.score", json!(1)),
            Err(PathError::UnknownPlayer(_))
        ));
    }

    #[test]
    fn test_set_path_rejects_scalar_parent() {
        let (mut state, _) = state_with_player();
        state.set_path("game.round", json!(1)).unwrap();
        assert!(matches!(
            state.set_path("game.round.inner", json!(2)),
            Err(PathError::NotAnObject { .. })
        ));
    }

    #[test]
    fn test_action_required_helpers() {
        let (mut state, id) = state_with_player();
        let other = PlayerId::new();
        state.add_player(other, Map::new());

        assert!(!state.any_player_action_required());
        state.set_all_action_required(true);
        assert!(state.any_player_action_required());

        state.set_player_field(id, ACTION_REQUIRED, json!(false));
        assert!(state.any_player_action_required());
        state.set_player_field(other, ACTION_REQUIRED, json!(false));
        assert!(!state.any_player_action_required());
    }

    #[test]
    fn test_state_serde_round_trip() {
        let (mut state, id) = state_with_player();
        state.set_path(&format!("players.{id}.score"), json!(5)).unwrap();

        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: GameState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(state, decoded);
    }
}
