//! Error taxonomy for the engine.
//!
//! Validation errors are raised synchronously before any session state
//! exists. Runtime errors are converted into the sticky `game.gameError`
//! record via [`game_artifacts::GameState::record_error`]; nothing crosses
//! the session boundary as a panic.

use thiserror::Error;

use crate::validator::ValidationReport;

/// A fault during state mutation or routing. Recorded into state, never
/// thrown to the hosting layer mid-session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("no instruction found for '{key}'")]
    MissingInstruction { key: String },

    #[error("deadlock in phase '{phase}': no transition can fire and no player input is possible")]
    Deadlock { phase: String },

    #[error("transition loop exceeded {cap} iterations")]
    IterationLimit { cap: usize },

    #[error("unresolved template placeholder in '{path}'")]
    TemplateUnresolved { path: String },

    #[error("unknown player '{alias}'")]
    UnknownPlayer { alias: String },

    #[error("invalid rng op at '{path}': {reason}")]
    BadRngSpec { path: String, reason: String },

    #[error(transparent)]
    Path(#[from] game_artifacts::PathError),
}

impl EngineError {
    /// The `errorType` string written into `game.gameError`.
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::TypeMismatch { .. } => "type_mismatch",
            EngineError::MissingInstruction { .. } => "missing_instruction",
            EngineError::Deadlock { .. } => "deadlock",
            EngineError::IterationLimit { .. } => "iteration_limit",
            EngineError::TemplateUnresolved { .. } => "template_unresolved",
            EngineError::UnknownPlayer { .. } => "unknown_player",
            EngineError::BadRngSpec { .. } => "bad_rng_spec",
            EngineError::Path(_) => "bad_path",
        }
    }
}

/// Errors that abort session creation before any state exists.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The artifact set failed static validation. The report holds every
    /// issue; the message joins the errors for the hosting layer.
    #[error("artifact validation failed: {message}")]
    Validation {
        message: String,
        report: ValidationReport,
    },

    #[error("transitions artifact declares no phases")]
    NoPhases,

    #[error("a game session needs at least one player")]
    NoPlayers,

    #[error(transparent)]
    Logic(#[from] crate::logic::LogicError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
