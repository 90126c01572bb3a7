//! Core board engine - pure, deterministic, and testable
//!
//! This crate contains the match-3 rules: the grid, swap resolution, match
//! detection, bonus creation and triggering, gravity and refill. It has
//! **no dependencies** on turn order, networking, or presentation, making it:
//!
//! - **Deterministic**: Same seed produces identical boards and cascades
//! - **Testable**: Every rule is exercised against hand-built grids
//! - **Replayable**: Any board round-trips through its [`BoardMatrix`] form
//!
//! # Module Structure
//!
//! - [`board`]: 8x7 grid with swap, bonus trigger, collapse/refill and cascade matching
//! - [`matrix`]: row-major text codec used on the wire
//! - [`rng`]: seeded generator behind every random engine decision
//!
//! # Rules
//!
//! - **Runs**: three or more same-colored tiles in a row or column are cleared
//! - **Rockets**: a run of exactly four leaves one rocket tile of random orientation
//! - **Bombs**: a run of five or more leaves one bomb tile
//! - **Bonus swaps**: swapping a bonus tile fires it instead of matching
//! - **Gravity**: columns compact downward, new tiles fill from the top
//! - **Never stuck**: a refilled board without a legal swap is recolored until it has one
//!
//! # Example
//!
//! ```
//! use match3_duel_core::Board;
//!
//! let mut board = Board::new(12345);
//! assert!(!board.step());
//! assert!(board.has_move());
//!
//! // Idle refill of a full board moves and spawns nothing.
//! let refill = board.collapse_and_fill();
//! assert!(refill.fallen.is_empty());
//! assert!(refill.spawned.is_empty());
//! ```

pub mod board;
pub mod matrix;
pub mod rng;

pub use match3_duel_types as types;

// Re-export commonly used types for convenience
pub use board::{Board, BonusPlacement, Fall, MatchOutcome, Refill, Spawn, SwapOutcome};
pub use matrix::{BoardMatrix, Grid, MatrixError};
pub use rng::SimpleRng;
