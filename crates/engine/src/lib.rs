//! Game engine - turn order, scoring and peer replication on top of the board
//!
//! The engine knows about players, modes and clocks but not about sockets.
//! Every peer message it consumes or produces is a [`GameMessage`]; the
//! adapter crate owns the JSON wire form.
//!
//! # Modes
//!
//! - **Chess**: players alternate; one shared board, mirrored on every peer
//! - **Time**: every player races on their own board until the clock runs out
//!   or the score passes the target

pub mod controller;
pub mod message;
pub mod scoring;

pub use match3_duel_core as core;
pub use match3_duel_types as types;

pub use controller::{
    CascadeStep, ControllerConfig, ControllerError, ControllerEvent, ErrorCause, GameController,
    Outcome, Phase, Role, TurnReport,
};
pub use message::GameMessage;
pub use scoring::{decide_winner, points_for, Verdict};
