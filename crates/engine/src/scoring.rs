//! Scoring module - points per turn and the end-of-game decision
//!
//! A successful swap earns one point per cell in its matched set, counting
//! the cell promoted to a bonus tile, or one per cell a fired bonus clears.
//! Cascade rounds after the swap earn nothing, and neither do the opponent's
//! moves.

use crate::core::SwapOutcome;
use crate::types::TieBreak;

/// Points for one swap
pub fn points_for(swap: &SwapOutcome) -> u32 {
    if !swap.success {
        return 0;
    }
    (swap.removed.len() + swap.bonuses.len()) as u32
}

/// Result of a finished time-mode race
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub winner: Option<String>,
    pub score: u32,
}

/// Decide the winner from the deciding peer's point of view.
///
/// `opponent_first` is true when the opponent had already finished before
/// the local player did. Higher score wins; ties follow `tie_break`.
pub fn decide_winner(
    me: &str,
    my_score: u32,
    opponent: Option<&str>,
    opponent_score: u32,
    opponent_first: bool,
    tie_break: TieBreak,
) -> Verdict {
    let opponent_wins = || Verdict {
        winner: opponent.map(str::to_string),
        score: opponent_score,
    };
    let i_win = || Verdict {
        winner: Some(me.to_string()),
        score: my_score,
    };

    if opponent_score > my_score {
        return opponent_wins();
    }
    if my_score > opponent_score {
        return i_win();
    }

    match tie_break {
        TieBreak::Draw => Verdict {
            winner: None,
            score: my_score,
        },
        TieBreak::FirstFinisher if opponent_first => opponent_wins(),
        TieBreak::FirstFinisher => i_win(),
    }
}
