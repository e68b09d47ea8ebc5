//! Phase-transition graph artifact - the game's top-level control flow.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to a declared phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseMetadata {
    pub phase: String,
    #[serde(default)]
    pub requires_player_input: bool,
}

/// A boolean guard on a transition.
///
/// `logic` is the raw JSON-logic expression tree; `None` marks a
/// non-deterministic or externally-resolved condition, which the router
/// treats as always blocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    pub id: String,
    pub logic: Option<Value>,
    #[serde(default = "default_true")]
    pub deterministic: bool,
    #[serde(default)]
    pub explain: String,
}

impl Precondition {
    /// A deterministic precondition with the given logic tree.
    pub fn new(id: impl Into<String>, logic: Value) -> Self {
        Self {
            id: id.into(),
            logic: Some(logic),
            deterministic: true,
            explain: String::new(),
        }
    }

    /// An externally-resolved precondition. The router never fires a
    /// transition guarded by one of these.
    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            logic: None,
            deterministic: false,
            explain: String::new(),
        }
    }

    pub fn with_explain(mut self, explain: impl Into<String>) -> Self {
        self.explain = explain.into();
        self
    }
}

fn default_true() -> bool {
    true
}

/// One directed, precondition-guarded edge between two phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub id: String,
    pub from_phase: String,
    pub to_phase: String,
    #[serde(default)]
    pub preconditions: Vec<Precondition>,
    #[serde(default)]
    pub checked_fields: Vec<String>,
}

impl Transition {
    pub fn new(
        id: impl Into<String>,
        from_phase: impl Into<String>,
        to_phase: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            from_phase: from_phase.into(),
            to_phase: to_phase.into(),
            preconditions: Vec::new(),
            checked_fields: Vec::new(),
        }
    }

    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }
}

/// The full transition graph handed over by the artifact-generation
/// collaborator.
///
/// Phase declaration order is meaningful: the first declared phase is the
/// init phase, and transitions are scanned in declaration order (the first
/// satisfied one fires).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransitionsArtifact {
    pub phases: Vec<String>,
    #[serde(default)]
    pub phase_metadata: Vec<PhaseMetadata>,
    pub transitions: Vec<Transition>,
}

impl TransitionsArtifact {
    pub fn new(phases: Vec<String>) -> Self {
        Self {
            phases,
            phase_metadata: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, phase: impl Into<String>, requires_player_input: bool) -> Self {
        self.phase_metadata.push(PhaseMetadata {
            phase: phase.into(),
            requires_player_input,
        });
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    /// Parse from the collaborator's JSON document.
    pub fn from_value(document: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document.clone())
    }

    /// The init phase is the first declared phase, by convention.
    pub fn init_phase(&self) -> Option<&str> {
        self.phases.first().map(String::as_str)
    }

    pub fn has_phase(&self, phase: &str) -> bool {
        self.phases.iter().any(|p| p == phase)
    }

    /// A phase with no declared outbound transition is terminal.
    pub fn is_terminal(&self, phase: &str) -> bool {
        !self.transitions.iter().any(|t| t.from_phase == phase)
    }

    /// Whether the phase waits for player input, per phase metadata
    /// (defaults to false for phases without a metadata entry).
    pub fn requires_player_input(&self, phase: &str) -> bool {
        self.phase_metadata
            .iter()
            .find(|m| m.phase == phase)
            .map(|m| m.requires_player_input)
            .unwrap_or(false)
    }

    /// Outbound transitions of a phase, in artifact declaration order.
    pub fn transitions_from<'a>(
        &'a self,
        phase: &'a str,
    ) -> impl Iterator<Item = &'a Transition> {
        self.transitions.iter().filter(move |t| t.from_phase == phase)
    }
}
