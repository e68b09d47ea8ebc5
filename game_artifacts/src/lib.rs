//! # Game Artifacts
//!
//! The "artifact bible" crate - data definitions for everything the
//! artifact-generation collaborator hands the engine: the game state tree,
//! the state schema, the phase-transition graph, and instruction payloads.
//! This crate is the single source of truth for artifact shapes and does not
//! contain any engine logic.

pub mod instructions;
pub mod schema;
pub mod state;
pub mod transitions;

pub use instructions::*;
pub use schema::*;
pub use state::*;
pub use transitions::*;
