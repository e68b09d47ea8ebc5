//! # Engine Core (Playable)
//!
//! The deterministic heart of Playable. Upstream, an LLM-driven stage turns
//! a prose game description into three declarative artifacts (state schema,
//! transition graph, instructions); this crate is the part that must be
//! *correct* rather than merely plausible. It turns those artifacts into a
//! running game: a router that decides which transition may fire, a
//! state-delta engine that mutates game state, and a static validator that
//! proves the artifacts cannot deadlock or reference undefined data.
//!
//! ## Core Components
//!
//! - **logic**: boolean precondition evaluator over the state tree, with the
//!   `allPlayers`/`anyPlayer` quantifiers
//! - **delta**: ordered application of typed state mutations
//! - **resolver**: rewrites positional player placeholders to session ids
//! - **validator**: build-time structural/reachability/field-reference gate
//! - **router**: the per-call phase state machine
//! - **session**: the owning facade (`create`, `initialize`, `submit_action`)
//!
//! ## Design Philosophy
//!
//! - **Artifact-Driven**: the core only consumes artifacts, never writes
//!   game rules
//! - **Errors in State**: runtime faults are recorded into `game.gameError`,
//!   never thrown across the session boundary
//! - **No I/O**: persistence, transports, and narration are external
//!   collaborators

pub mod delta;
pub mod error;
pub mod logic;
pub mod resolver;
pub mod rng;
pub mod router;
pub mod session;
pub mod validator;

pub use delta::*;
pub use error::*;
pub use logic::*;
pub use resolver::*;
pub use rng::*;
pub use router::*;
pub use session::*;
pub use validator::*;
