//! Deterministic action router - decides what happens next, never how.
//!
//! The router owns the compiled form of one artifact set and answers a
//! single question: given the current state, which transition fires, or is
//! the session waiting on players, or is it stuck? It never mutates state;
//! the session loop applies whatever the router selects.

use game_artifacts::{GameState, Instruction, InstructionSet, Transition, TransitionsArtifact};
use std::collections::BTreeMap;

use crate::logic::{evaluate_bool, EvalContext, Expr, LogicError};

/// A precondition with its logic tree parsed once, at compile time.
#[derive(Debug, Clone)]
pub struct CompiledPrecondition {
    pub id: String,
    /// `None` marks an externally-resolved condition, which always blocks.
    expr: Option<Expr>,
    pub deterministic: bool,
    pub explain: String,
}

impl CompiledPrecondition {
    fn compile(raw: &game_artifacts::Precondition) -> Result<Self, LogicError> {
        let expr = raw.logic.as_ref().map(Expr::parse).transpose()?;
        Ok(Self {
            id: raw.id.clone(),
            expr,
            deterministic: raw.deterministic,
            explain: raw.explain.clone(),
        })
    }

    /// Whether this precondition currently holds. An externally-resolved
    /// precondition never holds here.
    pub fn holds(&self, ctx: &EvalContext<'_>) -> bool {
        match &self.expr {
            Some(expr) => evaluate_bool(expr, ctx),
            None => false,
        }
    }
}

/// One transition edge with compiled guards.
#[derive(Debug, Clone)]
pub struct CompiledTransition {
    pub id: String,
    pub from_phase: String,
    pub to_phase: String,
    pub preconditions: Vec<CompiledPrecondition>,
}

impl CompiledTransition {
    fn compile(raw: &Transition) -> Result<Self, LogicError> {
        Ok(Self {
            id: raw.id.clone(),
            from_phase: raw.from_phase.clone(),
            to_phase: raw.to_phase.clone(),
            preconditions: raw
                .preconditions
                .iter()
                .map(CompiledPrecondition::compile)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Satisfied iff every precondition holds. A transition with no
    /// preconditions is unconditionally satisfied.
    pub fn satisfied(&self, ctx: &EvalContext<'_>) -> bool {
        self.preconditions.iter().all(|p| p.holds(ctx))
    }
}

/// An artifact set compiled for routing: transition logic and action checks
/// are parsed exactly once, so the per-step path does no JSON traversal.
#[derive(Debug, Clone)]
pub struct CompiledGame {
    pub artifact: TransitionsArtifact,
    pub instructions: InstructionSet,
    transitions: Vec<CompiledTransition>,
    action_checks: BTreeMap<String, Vec<(Expr, String)>>,
}

impl CompiledGame {
    /// Compile a resolved artifact set. Fails only on malformed logic, which
    /// validation normally catches first.
    pub fn compile(
        artifact: TransitionsArtifact,
        instructions: InstructionSet,
    ) -> Result<Self, LogicError> {
        let transitions = artifact
            .transitions
            .iter()
            .map(CompiledTransition::compile)
            .collect::<Result<_, _>>()?;

        let mut action_checks = BTreeMap::new();
        for (phase, instruction) in &instructions.player_phase_instructions {
            let Some(validation) = &instruction.validation else {
                continue;
            };
            let mut checks = Vec::with_capacity(validation.checks.len());
            for check in &validation.checks {
                checks.push((Expr::parse(&check.precondition)?, check.error_message.clone()));
            }
            action_checks.insert(phase.clone(), checks);
        }

        Ok(Self {
            artifact,
            instructions,
            transitions,
            action_checks,
        })
    }

    pub fn init_phase(&self) -> Option<&str> {
        self.artifact.init_phase()
    }

    pub fn is_terminal(&self, phase: &str) -> bool {
        self.artifact.is_terminal(phase)
    }

    pub fn requires_player_input(&self, phase: &str) -> bool {
        self.artifact.requires_player_input(phase)
    }

    /// Compiled outbound transitions of a phase, in declaration order.
    pub fn transitions_from<'a, 'p>(
        &'a self,
        phase: &'p str,
    ) -> impl Iterator<Item = &'a CompiledTransition> + use<'a, 'p> {
        self.transitions.iter().filter(move |t| t.from_phase == phase)
    }

    /// Ordered action-validation checks for a phase.
    pub fn action_checks(&self, phase: &str) -> &[(Expr, String)] {
        self.action_checks
            .get(phase)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn phase_instruction(&self, phase: &str) -> Option<&Instruction> {
        self.instructions.for_phase(phase)
    }

    pub fn transition_instruction(&self, transition_id: &str) -> Option<&Instruction> {
        self.instructions.for_transition(transition_id)
    }
}

/// A condition the session loop cannot route past.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterFault {
    /// An automatic phase where no outbound transition is satisfied. Nothing
    /// can ever change the state again, so the session must halt.
    Deadlock { phase: String },
}

/// The router's verdict for one state snapshot.
#[derive(Debug, Clone)]
pub struct StepOutcome<'a> {
    /// The session is waiting on at least one player action.
    pub requires_player_input: bool,
    /// The first satisfied outbound transition, in declaration order.
    pub selected: Option<&'a CompiledTransition>,
    pub fault: Option<RouterFault>,
}

impl StepOutcome<'_> {
    fn quiescent() -> Self {
        Self {
            requires_player_input: false,
            selected: None,
            fault: None,
        }
    }

    pub fn transition_ready(&self) -> bool {
        self.selected.is_some()
    }
}

/// Route one step: pick the first satisfied transition out of the current
/// phase, or report why none fires. Pure; the caller applies the result.
pub fn step<'a>(state: &GameState, game: &'a CompiledGame) -> StepOutcome<'a> {
    // A faulted or finished session routes nowhere.
    if state.game_error().is_some() || state.game_ended() {
        return StepOutcome::quiescent();
    }

    let phase = state.current_phase();
    let ctx = EvalContext::new(state, None);
    for transition in game.transitions_from(phase) {
        if transition.satisfied(&ctx) {
            return StepOutcome {
                requires_player_input: false,
                selected: Some(transition),
                fault: None,
            };
        }
    }

    if game.requires_player_input(phase) {
        // Blocked on players, not stuck: an incoming action can still
        // change the state.
        return StepOutcome {
            requires_player_input: true,
            selected: None,
            fault: None,
        };
    }
    if game.is_terminal(phase) {
        return StepOutcome::quiescent();
    }
    StepOutcome {
        requires_player_input: false,
        selected: None,
        fault: Some(RouterFault::Deadlock {
            phase: phase.to_string(),
        }),
    }
}
