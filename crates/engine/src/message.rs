//! Controller-level messages exchanged between peers.
//!
//! These are the typed form of every protocol command. The adapter maps them
//! to and from the JSON wire records; the controller only ever sees this enum.

use crate::core::{BoardMatrix, BonusPlacement, Fall, Spawn};
use crate::types::{GameMode, Pos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameMessage {
    /// Host announces the game: turn order and the authoritative start board
    StartGame {
        mode: GameMode,
        queue: Vec<String>,
        current: String,
        nicknames: Vec<String>,
        board: BoardMatrix,
        time_limit: u32,
    },
    /// A player's swap and its immediate outcome
    Swap {
        a: Pos,
        b: Pos,
        next_player: String,
        board: BoardMatrix,
        success: bool,
        removed: Vec<Pos>,
        bonuses: Vec<BonusPlacement>,
    },
    /// First refill after a swap
    AutoSwap {
        fallen: Vec<Fall>,
        spawned: Vec<Spawn>,
        board: BoardMatrix,
    },
    /// A cascade round: spontaneous match, then refill
    AutoSwapCircle {
        fallen: Vec<Fall>,
        removed: Vec<Pos>,
        spawned: Vec<Spawn>,
        bonuses: Vec<BonusPlacement>,
        board: BoardMatrix,
    },
    /// Time mode mirror of the sender's board
    Board { board: BoardMatrix },
    /// Time mode score update
    Score { score: u32 },
    /// Time mode elapsed seconds
    Time { time: u32 },
    /// Sender stopped playing with this final score
    Finish { score: u32 },
    /// Final result; `winner` is absent on a draw
    EndGame { winner: Option<String>, score: u32 },
}

impl GameMessage {
    /// Wire discriminator
    pub fn command(&self) -> &'static str {
        match self {
            GameMessage::StartGame { .. } => "start_game",
            GameMessage::Swap { .. } => "swap",
            GameMessage::AutoSwap { .. } => "auto_swap",
            GameMessage::AutoSwapCircle { .. } => "auto_swap_circle",
            GameMessage::Board { .. } => "board",
            GameMessage::Score { .. } => "score",
            GameMessage::Time { .. } => "time",
            GameMessage::Finish { .. } => "finish",
            GameMessage::EndGame { .. } => "end_game",
        }
    }
}
