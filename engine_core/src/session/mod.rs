//! Game session - the single entry point the hosting layer talks to.
//!
//! A session owns one compiled artifact set, the state tree, the player
//! mapping, and the seeded RNG. It exposes exactly two moves: initialize
//! the session, and submit a player action. Everything else (routing,
//! deltas, phase entry, error recording) happens inside the bounded
//! transition loop.

use game_artifacts::{
    GameState, InstructionSet, PlayerId, StateSchema, TransitionsArtifact, ACTIONS_ALLOWED,
    ACTION_REQUIRED, CURRENT_ACTION, ILLEGAL_ACTION_COUNT, PRIVATE_MESSAGE,
};
use serde_json::Value;

use crate::delta;
use crate::error::{EngineError, SessionError};
use crate::logic::{evaluate_bool, EvalContext};
use crate::resolver::{resolve_instruction_set, resolve_transitions, PlayerMapping};
use crate::rng::GameRng;
use crate::router::{self, CompiledGame, RouterFault};
use crate::validator::{validate, ValidationReport};

/// Default bound on back-to-back automatic transitions.
pub const DEFAULT_MAX_TRANSITION_ITERATIONS: usize = 30;

/// Tunable knobs for one session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// How many transitions may fire in a row before the session is
    /// declared runaway.
    pub max_transition_iterations: usize,
    /// Seed for every RNG draw the session makes. Same artifacts, same
    /// seed, same actions: same game.
    pub seed: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_transition_iterations: DEFAULT_MAX_TRANSITION_ITERATIONS,
            seed: 0,
        }
    }
}

impl SessionConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

/// What the hosting layer learns after initialize/submit returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionOutcome {
    /// False when the submission was rejected (or the session is faulted or
    /// already over).
    pub accepted: bool,
    /// The session is now waiting on at least one player action.
    pub requires_player_input: bool,
    pub game_ended: bool,
}

/// One running game.
pub struct GameSession {
    game: CompiledGame,
    schema: StateSchema,
    state: GameState,
    mapping: PlayerMapping,
    rng: GameRng,
    config: SessionConfig,
}

impl GameSession {
    /// Validate the artifact set, resolve player templates, compile the
    /// logic, and build the initial state. Fails synchronously; once a
    /// session exists, faults are recorded into state instead.
    pub fn create(
        transitions: &TransitionsArtifact,
        schema: StateSchema,
        instructions: &InstructionSet,
        player_names: &[impl AsRef<str>],
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        if player_names.is_empty() {
            return Err(SessionError::NoPlayers);
        }
        let report = validate(transitions, &schema, Some(instructions));
        if !report.valid {
            return Err(SessionError::Validation {
                message: report.joined_errors(),
                report,
            });
        }

        let ids: Vec<PlayerId> = player_names.iter().map(|_| PlayerId::new()).collect();
        let mapping = PlayerMapping::from_ordered(&ids);
        let resolved_transitions = resolve_transitions(transitions, &mapping)?;
        let resolved_instructions = resolve_instruction_set(instructions, &mapping)?;
        let game = CompiledGame::compile(resolved_transitions, resolved_instructions)?;
        let init = game.init_phase().ok_or(SessionError::NoPhases)?.to_string();

        let mut state = GameState::new();
        state.game = schema.default_game_record();
        for (id, name) in ids.iter().zip(player_names) {
            let mut record = schema.default_player_record();
            record.insert("name".to_string(), Value::String(name.as_ref().to_string()));
            state.add_player(*id, record);
        }

        let rng = GameRng::new(config.seed);
        let mut session = Self {
            game,
            schema,
            state,
            mapping,
            rng,
            config,
        };
        enter_phase(&mut session.state, &session.game, &init);
        Ok(session)
    }

    /// Run the transition loop from the init phase until the session waits
    /// on players, ends, or faults.
    pub fn initialize(&mut self) -> ActionOutcome {
        self.run_loop();
        self.outcome(true)
    }

    /// Submit one player action. Rejections are normal outcomes: the
    /// submitter's `illegalActionCount` and `privateMessage` change, the
    /// rest of the state does not. An accepted action is stored, the phase
    /// instruction's delta applies, and the transition loop runs.
    pub fn submit_action(
        &mut self,
        player: PlayerId,
        payload: Value,
    ) -> Result<ActionOutcome, SessionError> {
        if self.state.game_error().is_some() || self.state.game_ended() {
            return Ok(self.outcome(false));
        }
        if self.state.player(player).is_none() {
            return Err(EngineError::UnknownPlayer {
                alias: player.to_string(),
            }
            .into());
        }

        let allowed = !matches!(
            self.state.player_field(player, ACTIONS_ALLOWED),
            Some(Value::Bool(false))
        );
        if !allowed {
            return Ok(self.reject(player, "actions are not allowed right now".to_string()));
        }
        let expected = self
            .state
            .player_field(player, ACTION_REQUIRED)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !expected {
            return Ok(self.reject(player, "no action is currently expected from you".to_string()));
        }

        let failure = {
            let ctx = EvalContext::new(&self.state, Some(&payload));
            self.game
                .action_checks(self.state.current_phase())
                .iter()
                .find(|(check, _)| !evaluate_bool(check, &ctx))
                .map(|(_, message)| message.clone())
        };
        if let Some(message) = failure {
            return Ok(self.reject(player, message));
        }

        self.state.set_player_field(player, CURRENT_ACTION, payload);
        self.state
            .set_player_field(player, ACTION_REQUIRED, Value::Bool(false));
        self.state
            .set_player_field(player, PRIVATE_MESSAGE, Value::String(String::new()));

        let phase = self.state.current_phase().to_string();
        if let Some(instruction) = self.game.phase_instruction(&phase) {
            if let Err(err) = delta::apply(&mut self.state, &instruction.state_delta, &mut self.rng)
            {
                self.state.record_error(err.error_type(), err.to_string());
                return Ok(self.outcome(true));
            }
        }

        self.run_loop();
        Ok(self.outcome(true))
    }

    /// Re-run static validation against the session's (resolved) artifacts.
    pub fn revalidate(&self) -> ValidationReport {
        validate(&self.game.artifact, &self.schema, Some(&self.game.instructions))
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Player ids in seating order (seat 1 first).
    pub fn player_ids(&self) -> &[PlayerId] {
        self.mapping.ids()
    }

    pub fn mapping(&self) -> &PlayerMapping {
        &self.mapping
    }

    fn reject(&mut self, player: PlayerId, message: String) -> ActionOutcome {
        let count = self
            .state
            .player_field(player, ILLEGAL_ACTION_COUNT)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        self.state
            .set_player_field(player, ILLEGAL_ACTION_COUNT, Value::from(count + 1));
        self.state
            .set_player_field(player, PRIVATE_MESSAGE, Value::String(message));
        self.outcome(false)
    }

    /// Fire satisfied transitions until the router has nothing to select,
    /// bounded by the configured iteration cap.
    fn run_loop(&mut self) {
        for _ in 0..self.config.max_transition_iterations {
            let verdict = router::step(&self.state, &self.game);
            if let Some(RouterFault::Deadlock { phase }) = verdict.fault {
                let err = EngineError::Deadlock { phase };
                self.state.record_error(err.error_type(), err.to_string());
                return;
            }
            let Some(transition) = verdict.selected else {
                return;
            };
            let id = transition.id.clone();
            let to_phase = transition.to_phase.clone();

            match self.game.transition_instruction(&id) {
                Some(instruction) => {
                    if let Err(err) =
                        delta::apply(&mut self.state, &instruction.state_delta, &mut self.rng)
                    {
                        self.state.record_error(err.error_type(), err.to_string());
                        return;
                    }
                }
                None => {
                    let err = EngineError::MissingInstruction { key: id };
                    self.state.record_error(err.error_type(), err.to_string());
                    return;
                }
            }
            enter_phase(&mut self.state, &self.game, &to_phase);
        }
        let err = EngineError::IterationLimit {
            cap: self.config.max_transition_iterations,
        };
        self.state.record_error(err.error_type(), err.to_string());
    }

    fn outcome(&self, accepted: bool) -> ActionOutcome {
        let verdict = router::step(&self.state, &self.game);
        ActionOutcome {
            accepted,
            requires_player_input: verdict.requires_player_input,
            game_ended: self.state.game_ended(),
        }
    }
}

/// Move the session into a phase and set the reserved flags that phase
/// entry implies.
fn enter_phase(state: &mut GameState, game: &CompiledGame, phase: &str) {
    state.set_current_phase(phase);
    if game.is_terminal(phase) {
        state.set_game_ended(true);
        state.set_all_action_required(false);
    } else if game.requires_player_input(phase) {
        state.set_all_action_required(true);
    }
}
