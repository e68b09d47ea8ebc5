//! Artifact validator - the build-time gate before a session may start.
//!
//! Static analysis of the transition graph and instruction set against the
//! schema: structural integrity, reachability/deadlock detection, and
//! field-reference legality. Validation is pure and idempotent; errors
//! abort session creation, warnings are surfaced but non-fatal.

use game_artifacts::{InstructionSet, StateSchema, TransitionsArtifact};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::logic::{Expr, LogicError, PLAYER_COUNT};

/// How bad an issue is. Errors make the artifact set unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Machine-readable issue category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    NoPhases,
    UnknownPhaseRef,
    DuplicateTransitionId,
    UnreachablePhase,
    DeadEndPhase,
    NoPathToCompletion,
    NoInitTransition,
    MalformedLogic,
    IndexedPlayerAccess,
    UnknownFieldRef,
    PhaseKeyMismatch,
    MissingPlayerInstruction,
    MissingTransitionInstruction,
    UnknownInstructionKey,
}

/// One finding of the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
}

/// The validator's verdict over one artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues.iter().any(|i| i.severity == Severity::Error);
        Self { valid, issues }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// All error messages joined, for the hosting layer's rejection reason.
    pub fn joined_errors(&self) -> String {
        self.errors()
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validate a transitions artifact against a schema, without an instruction
/// set (the build-time gate exposed to the hosting layer).
pub fn validate_artifacts(
    transitions: &TransitionsArtifact,
    schema: &StateSchema,
) -> ValidationReport {
    validate(transitions, schema, None)
}

/// Full validation, including the phase/instruction cross-check when the
/// instruction set is available.
pub fn validate(
    transitions: &TransitionsArtifact,
    schema: &StateSchema,
    instructions: Option<&InstructionSet>,
) -> ValidationReport {
    let mut issues = Vec::new();

    check_structure(transitions, &mut issues);
    if transitions.phases.is_empty() {
        return ValidationReport::from_issues(issues);
    }
    check_connectivity(transitions, &mut issues);
    check_reachability(transitions, &mut issues);
    check_init_coverage(transitions, &mut issues);
    check_field_references(transitions, schema, &mut issues);
    if let Some(instructions) = instructions {
        check_instruction_coverage(transitions, instructions, schema, &mut issues);
    }

    ValidationReport::from_issues(issues)
}

fn issue(
    issues: &mut Vec<ValidationIssue>,
    severity: Severity,
    code: IssueCode,
    message: impl Into<String>,
) {
    issues.push(ValidationIssue {
        severity,
        code,
        message: message.into(),
    });
}

fn check_structure(transitions: &TransitionsArtifact, issues: &mut Vec<ValidationIssue>) {
    if transitions.phases.is_empty() {
        issue(
            issues,
            Severity::Error,
            IssueCode::NoPhases,
            "transitions artifact declares no phases",
        );
        return;
    }
    for metadata in &transitions.phase_metadata {
        if !transitions.has_phase(&metadata.phase) {
            issue(
                issues,
                Severity::Error,
                IssueCode::UnknownPhaseRef,
                format!("phase metadata names undeclared phase '{}'", metadata.phase),
            );
        }
    }
    let mut seen_ids = HashSet::new();
    for transition in &transitions.transitions {
        if !seen_ids.insert(transition.id.as_str()) {
            issue(
                issues,
                Severity::Error,
                IssueCode::DuplicateTransitionId,
                format!("transition id '{}' is declared twice", transition.id),
            );
        }
        for (role, phase) in [
            ("fromPhase", &transition.from_phase),
            ("toPhase", &transition.to_phase),
        ] {
            if !transitions.has_phase(phase) {
                issue(
                    issues,
                    Severity::Error,
                    IssueCode::UnknownPhaseRef,
                    format!(
                        "transition '{}' {role} '{phase}' is not a declared phase",
                        transition.id
                    ),
                );
            }
        }
    }
}

fn check_connectivity(transitions: &TransitionsArtifact, issues: &mut Vec<ValidationIssue>) {
    let init = transitions.init_phase().unwrap_or_default().to_string();
    let mut in_degree: BTreeMap<&str, usize> =
        transitions.phases.iter().map(|p| (p.as_str(), 0)).collect();
    for transition in &transitions.transitions {
        if let Some(count) = in_degree.get_mut(transition.to_phase.as_str()) {
            *count += 1;
        }
    }
    for phase in &transitions.phases {
        if phase != &init && in_degree[phase.as_str()] == 0 {
            issue(
                issues,
                Severity::Warning,
                IssueCode::UnreachablePhase,
                format!("phase '{phase}' has no inbound transition and can never be reached"),
            );
        }
        // A phase with no way out is terminal by definition; if it still
        // expects player input, play would stall there forever.
        if transitions.is_terminal(phase) && transitions.requires_player_input(phase) {
            issue(
                issues,
                Severity::Error,
                IssueCode::DeadEndPhase,
                format!("phase '{phase}' awaits player input but has no outbound transition"),
            );
        }
    }
}

/// Every non-terminal phase must have a path to some terminal phase. This
/// deliberately includes the init phase: a game that can never finish from
/// its first phase is reported here too, not left to the runtime.
fn check_reachability(transitions: &TransitionsArtifact, issues: &mut Vec<ValidationIssue>) {
    let terminals: BTreeSet<&str> = transitions
        .phases
        .iter()
        .map(String::as_str)
        .filter(|p| transitions.is_terminal(p))
        .collect();

    for phase in &transitions.phases {
        if terminals.contains(phase.as_str()) {
            continue;
        }
        if !reaches_terminal(transitions, phase, &terminals) {
            issue(
                issues,
                Severity::Error,
                IssueCode::NoPathToCompletion,
                format!("phase '{phase}' has no path to completion"),
            );
        }
    }
}

fn reaches_terminal(
    transitions: &TransitionsArtifact,
    start: &str,
    terminals: &BTreeSet<&str>,
) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    seen.insert(start);
    queue.push_back(start);
    while let Some(phase) = queue.pop_front() {
        if terminals.contains(phase) {
            return true;
        }
        for transition in transitions.transitions_from(phase) {
            let next = transition.to_phase.as_str();
            if transitions.has_phase(next) && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    false
}

fn check_init_coverage(transitions: &TransitionsArtifact, issues: &mut Vec<ValidationIssue>) {
    let init = transitions.init_phase().unwrap_or_default();
    if transitions.transitions_from(init).next().is_none() {
        issue(
            issues,
            Severity::Error,
            IssueCode::NoInitTransition,
            format!("no transition originates from the init phase '{init}'"),
        );
    }
}

fn check_field_references(
    transitions: &TransitionsArtifact,
    schema: &StateSchema,
    issues: &mut Vec<ValidationIssue>,
) {
    for transition in &transitions.transitions {
        for precondition in &transition.preconditions {
            let Some(logic) = &precondition.logic else {
                continue;
            };
            check_logic(
                logic,
                schema,
                &format!("precondition '{}' of transition '{}'", precondition.id, transition.id),
                issues,
            );
        }
        for field in &transition.checked_fields {
            if !reference_is_legal(field, schema) {
                issue(
                    issues,
                    Severity::Warning,
                    IssueCode::UnknownFieldRef,
                    format!(
                        "transition '{}' checks undeclared field '{field}'",
                        transition.id
                    ),
                );
            }
        }
    }
}

/// Parse one logic tree and verify every referenced path against the schema.
fn check_logic(
    logic: &Value,
    schema: &StateSchema,
    context: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let expr = match Expr::parse(logic) {
        Ok(expr) => expr,
        Err(LogicError::IndexedPlayerAccess(path)) => {
            issue(
                issues,
                Severity::Error,
                IssueCode::IndexedPlayerAccess,
                format!(
                    "{context} indexes the player map ('{path}'); use allPlayers/anyPlayer instead"
                ),
            );
            return;
        }
        Err(err) => {
            issue(
                issues,
                Severity::Error,
                IssueCode::MalformedLogic,
                format!("{context} is malformed: {err}"),
            );
            return;
        }
    };

    let mut vars = Vec::new();
    let mut player_fields = Vec::new();
    expr.collect_refs(&mut vars, &mut player_fields);
    for path in vars {
        if !reference_is_legal(&path, schema) {
            issue(
                issues,
                Severity::Error,
                IssueCode::UnknownFieldRef,
                format!("{context} references undeclared field '{path}'"),
            );
        }
    }
    for field in player_fields {
        let path = format!("players.{field}");
        if !schema.is_declared(&path) {
            issue(
                issues,
                Severity::Error,
                IssueCode::UnknownFieldRef,
                format!("{context} quantifies over undeclared player field '{field}'"),
            );
        }
    }
}

/// A reference is legal if, once index notation is normalized away, it is a
/// schema-declared path or a computed-context field.
fn reference_is_legal(path: &str, schema: &StateSchema) -> bool {
    if path == PLAYER_COUNT || path == "input" || path.starts_with("input.") {
        return true;
    }
    schema.is_declared(&normalize_reference(path))
}

/// Normalize away wildcard/numeric/id index notation: `foo[*].x`,
/// `foo[3].x`, and `foo[uuid].x` all become `foo.x`, and the player-id
/// segment of `players.<anything>.field` is dropped.
pub fn normalize_reference(path: &str) -> String {
    let mut cleaned = String::with_capacity(path.len());
    let mut depth = 0usize;
    for c in path.chars() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }
    let mut segments: Vec<&str> = cleaned.split('.').filter(|s| !s.is_empty()).collect();
    if segments.first() == Some(&"players") && segments.len() >= 3 {
        segments.remove(1);
    }
    segments.join(".")
}

fn check_instruction_coverage(
    transitions: &TransitionsArtifact,
    instructions: &InstructionSet,
    schema: &StateSchema,
    issues: &mut Vec<ValidationIssue>,
) {
    // Instruction phase keys must exactly match declared phase strings; a
    // near-miss here silently breaks player-action routing.
    for phase in instructions.player_phase_instructions.keys() {
        if !transitions.has_phase(phase) {
            issue(
                issues,
                Severity::Error,
                IssueCode::PhaseKeyMismatch,
                format!("player instruction key '{phase}' matches no declared phase"),
            );
        }
    }
    for phase in &transitions.phases {
        if transitions.requires_player_input(phase)
            && instructions.for_phase(phase).is_none()
        {
            issue(
                issues,
                Severity::Error,
                IssueCode::MissingPlayerInstruction,
                format!("phase '{phase}' requires player input but has no player instruction"),
            );
        }
    }

    let transition_ids: BTreeSet<&str> = transitions
        .transitions
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    for id in instructions.transition_instructions.keys() {
        if !transition_ids.contains(id.as_str()) {
            issue(
                issues,
                Severity::Warning,
                IssueCode::UnknownInstructionKey,
                format!("transition instruction key '{id}' matches no transition"),
            );
        }
    }
    for transition in &transitions.transitions {
        if instructions.for_transition(&transition.id).is_none() {
            issue(
                issues,
                Severity::Warning,
                IssueCode::MissingTransitionInstruction,
                format!("transition '{}' has no instruction payload", transition.id),
            );
        }
    }

    for (phase, instruction) in &instructions.player_phase_instructions {
        if let Some(validation) = &instruction.validation {
            for (index, check) in validation.checks.iter().enumerate() {
                check_logic(
                    &check.precondition,
                    schema,
                    &format!("validation check {index} of phase '{phase}'"),
                    issues,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_artifacts::{FieldSpec, FieldType, Instruction, Precondition, Transition};
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::new()
            .with_game_field(
                "currentRound",
                FieldSpec::new(FieldType::Integer).with_default(json!(1)),
            )
            .with_game_field("maxRounds", FieldSpec::new(FieldType::Integer))
            .with_player_field("score", FieldSpec::new(FieldType::Integer))
    }

    fn sound_artifact() -> TransitionsArtifact {
        TransitionsArtifact::new(vec!["setup".into(), "playing".into(), "finished".into()])
            .with_metadata("playing", true)
            .with_transition(
                Transition::new("t_start", "setup", "playing")
                    .with_precondition(Precondition::new("p_ready", json!({">=": [{"var": "playerCount"}, 1]}))),
            )
            .with_transition(
                Transition::new("t_end", "playing", "finished").with_precondition(
                    Precondition::new(
                        "p_done",
                        json!({">=": [{"var": "game.currentRound"}, {"var": "game.maxRounds"}]}),
                    ),
                ),
            )
    }

    #[test]
    fn test_sound_artifact_passes() {
        let report = validate_artifacts(&sound_artifact(), &schema());
        assert!(report.valid, "unexpected issues: {:?}", report.issues);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let artifact = sound_artifact();
        let schema = schema();
        let first = validate_artifacts(&artifact, &schema);
        let second = validate_artifacts(&artifact, &schema);
        assert_eq!(first, second);
    }

    #[test]
    fn test_undeclared_phase_is_structural_error() {
        let artifact = sound_artifact()
            .with_transition(Transition::new("t_bad", "playing", "limbo"));
        let report = validate_artifacts(&artifact, &schema());
        assert!(!report.valid);
        assert!(report.errors().any(|i| i.code == IssueCode::UnknownPhaseRef));
    }

    #[test]
    fn test_duplicate_transition_id_is_error() {
        let artifact = sound_artifact()
            .with_transition(Transition::new("t_end", "playing", "finished"));
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.errors().any(|i| i.code == IssueCode::DuplicateTransitionId));
    }

    #[test]
    fn test_unreachable_phase_is_warning_only() {
        let artifact = TransitionsArtifact::new(vec![
            "setup".into(),
            "playing".into(),
            "bonus".into(),
            "finished".into(),
        ])
        .with_transition(Transition::new("t_start", "setup", "playing"))
        .with_transition(Transition::new("t_end", "playing", "finished"))
        .with_transition(Transition::new("t_bonus", "bonus", "finished"));
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.valid);
        assert!(report.warnings().any(|i| i.code == IssueCode::UnreachablePhase));
    }

    #[test]
    fn test_input_phase_without_exit_is_deadlock_error() {
        let artifact = TransitionsArtifact::new(vec!["setup".into(), "stuck".into()])
            .with_metadata("stuck", true)
            .with_transition(Transition::new("t_start", "setup", "stuck"));
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.errors().any(|i| i.code == IssueCode::DeadEndPhase));
    }

    #[test]
    fn test_cycle_with_no_terminal_has_no_path_to_completion() {
        let artifact = TransitionsArtifact::new(vec!["a".into(), "b".into()])
            .with_transition(Transition::new("t_ab", "a", "b"))
            .with_transition(Transition::new("t_ba", "b", "a"));
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.errors().any(|i| i.code == IssueCode::NoPathToCompletion));
    }

    #[test]
    fn test_missing_init_transition_is_error() {
        let artifact = TransitionsArtifact::new(vec!["setup".into(), "playing".into()])
            .with_transition(Transition::new("t_loop", "playing", "playing"));
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.errors().any(|i| i.code == IssueCode::NoInitTransition));
    }

    #[test]
    fn test_unknown_field_reference_is_error() {
        let artifact = sound_artifact().with_transition(
            Transition::new("t_extra", "playing", "finished").with_precondition(
                Precondition::new("p_ghost", json!({"==": [{"var": "game.ghost"}, 1]})),
            ),
        );
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.errors().any(|i| i.code == IssueCode::UnknownFieldRef));
    }

    #[test]
    fn test_index_notation_normalizes_away() {
        assert_eq!(normalize_reference("foo[*].x"), "foo.x");
        assert_eq!(normalize_reference("foo[3].x"), "foo.x");
        assert_eq!(
            normalize_reference("players.550e8400-e29b-41d4-a716-446655440000.score"),
            "players.score"
        );
        assert_eq!(normalize_reference("players.player1.score"), "players.score");
        assert_eq!(normalize_reference("game.pot.chips"), "game.pot.chips");
    }

    #[test]
    fn test_indexed_player_access_is_rejected_outright() {
        // players[0].score would normalize to a declared path; it is still
        // an error, independent of whether the normalized path exists.
        let artifact = sound_artifact().with_transition(
            Transition::new("t_indexed", "playing", "finished").with_precondition(
                Precondition::new("p_first", json!({"==": [{"var": "players[0].score"}, 1]})),
            ),
        );
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.errors().any(|i| i.code == IssueCode::IndexedPlayerAccess));
    }

    #[test]
    fn test_positional_player_references_are_legal() {
        let artifact = sound_artifact().with_transition(
            Transition::new("t_named", "playing", "finished").with_precondition(
                Precondition::new(
                    "p_named",
                    json!({">": [{"var": "players.player1.score"}, 0]}),
                ),
            ),
        );
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.valid, "unexpected issues: {:?}", report.issues);
    }

    #[test]
    fn test_quantified_field_must_be_declared() {
        let artifact = sound_artifact().with_transition(
            Transition::new("t_q", "playing", "finished").with_precondition(
                Precondition::new("p_q", json!({"allPlayers": ["mana", ">", 0]})),
            ),
        );
        let report = validate_artifacts(&artifact, &schema());
        assert!(report.errors().any(|i| i.code == IssueCode::UnknownFieldRef));
    }

    #[test]
    fn test_instruction_cross_check() {
        let artifact = sound_artifact();
        let instructions = InstructionSet::new()
            // Key differs from the declared phase string by case.
            .with_phase_instruction("Playing", Instruction::default())
            .with_transition_instruction("t_start", Instruction::default());

        let report = validate(&artifact, &schema(), Some(&instructions));
        assert!(!report.valid);
        assert!(report.errors().any(|i| i.code == IssueCode::PhaseKeyMismatch));
        assert!(report
            .errors()
            .any(|i| i.code == IssueCode::MissingPlayerInstruction));
        // Missing transition instructions only warn at validation time.
        assert!(report
            .warnings()
            .any(|i| i.code == IssueCode::MissingTransitionInstruction));
    }

    #[test]
    fn test_complete_instruction_set_passes() {
        let artifact = sound_artifact();
        let instructions = InstructionSet::new()
            .with_phase_instruction(
                "playing",
                Instruction::default()
                    .with_check(json!({"in": [{"var": "input.move"}, ["hit", "stand"]]}), "bad move"),
            )
            .with_transition_instruction("t_start", Instruction::default())
            .with_transition_instruction("t_end", Instruction::default());
        let report = validate(&artifact, &schema(), Some(&instructions));
        assert!(report.valid, "unexpected issues: {:?}", report.issues);
    }
}
