//! Core types module - shared data structures and constants
//!
//! This module defines the fundamental types used throughout the application.
//! All types are pure data structures with no external dependencies, making them
//! usable in any context (board engine, turn controller, wire protocol).
//!
//! # Board Dimensions
//!
//! The playfield is a fixed 8 x 7 grid:
//!
//! - **Rows**: 8 (indexed 0-7, top to bottom)
//! - **Columns**: 7 (indexed 0-6, left to right)
//!
//! Positions are always `(row, col)`. A tile never stores its own position;
//! the grid slot it occupies is the only source of truth.
//!
//! # Session Timing Constants
//!
//! | Constant | Value | Description |
//! |----------|-------|-------------|
//! | `BEACON_INTERVAL_SECS` | 5 | Host re-broadcasts its session code this often |
//! | `DISCOVERY_WINDOW_SECS` | 15 | How long a client listens for a beacon |
//! | `DISCOVERY_RECV_TIMEOUT_SECS` | 5 | Per-datagram receive timeout while discovering |
//! | `CLOCK_TICK_SECS` | 1 | Time mode clock resolution |
//!
//! # Examples
//!
//! ```
//! use match3_duel_types::{Bonus, Color, Pos, Tile, BOARD_COLS, BOARD_ROWS};
//!
//! let tile = Tile::plain(Color::Red);
//! assert_eq!(tile.code(), "R");
//!
//! let rocket = Tile::new(Color::Yellow, Bonus::RocketHorizontal);
//! assert_eq!(rocket.code(), "HY");
//!
//! assert!(Pos::new(0, 0).is_adjacent(Pos::new(0, 1)));
//! assert_eq!((BOARD_ROWS, BOARD_COLS), (8, 7));
//! ```

/// Board height in cells (8 rows)
pub const BOARD_ROWS: usize = 8;

/// Board width in cells (7 columns)
pub const BOARD_COLS: usize = 7;

/// Minimum run length that counts as a match
pub const MIN_RUN: usize = 3;

/// Run length that promotes a rocket
pub const ROCKET_RUN: usize = 4;

/// Run length (and above) that promotes a bomb
pub const BOMB_RUN: usize = 5;

/// Time mode: a player finishes once their score exceeds this value
pub const SCORE_TARGET: u32 = 999;

/// Time mode limit bounds, in seconds
pub const TIME_LIMIT_MIN_SECS: u32 = 20;
pub const TIME_LIMIT_MAX_SECS: u32 = 999;

/// Default time mode limit, in seconds
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 60;

/// Default listening port; also the default session code
pub const DEFAULT_PORT: u16 = 8080;

/// Host beacon period
pub const BEACON_INTERVAL_SECS: u64 = 5;

/// Client discovery window
pub const DISCOVERY_WINDOW_SECS: u64 = 15;

/// Client discovery per-receive timeout
pub const DISCOVERY_RECV_TIMEOUT_SECS: u64 = 5;

/// Time mode clock resolution
pub const CLOCK_TICK_SECS: u64 = 1;

/// Handshake reply accepting a nickname
pub const HANDSHAKE_WELCOME: &str = "WELCOME";

/// Handshake reply rejecting a nickname
pub const HANDSHAKE_INVALID_NICKNAME: &str = "INVALID_NICKNAME";

/// How long the host waits for a new connection's nickname line
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// The four tile colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Color {
    Orange,
    Purple,
    Red,
    Yellow,
}

impl Color {
    /// Every color, in a fixed order (used for uniform random draws)
    pub const ALL: [Color; 4] = [Color::Orange, Color::Purple, Color::Red, Color::Yellow];

    /// Parse color from its wire name (case-insensitive)
    ///
    /// # Examples
    ///
    /// ```
    /// use match3_duel_types::Color;
    ///
    /// assert_eq!(Color::from_str("orange"), Some(Color::Orange));
    /// assert_eq!(Color::from_str("RED"), Some(Color::Red));
    /// assert_eq!(Color::from_str("green"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "orange" => Some(Color::Orange),
            "purple" => Some(Color::Purple),
            "red" => Some(Color::Red),
            "yellow" => Some(Color::Yellow),
            _ => None,
        }
    }

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Orange => "orange",
            Color::Purple => "purple",
            Color::Red => "red",
            Color::Yellow => "yellow",
        }
    }

    /// Single-letter board matrix code
    pub fn code(&self) -> char {
        match self {
            Color::Orange => 'O',
            Color::Purple => 'P',
            Color::Red => 'R',
            Color::Yellow => 'Y',
        }
    }

    /// Parse a board matrix color letter (case-insensitive)
    pub fn from_code(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'O' => Some(Color::Orange),
            'P' => Some(Color::Purple),
            'R' => Some(Color::Red),
            'Y' => Some(Color::Yellow),
            _ => None,
        }
    }
}

/// Special removal effect carried by a tile
///
/// - **None**: plain tile, cleared normally when matched
/// - **RocketHorizontal**: clears its row toward column 0
/// - **RocketVertical**: clears its column toward row 0
/// - **Bomb**: clears the 3x3 neighborhood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Bonus {
    #[default]
    None,
    RocketHorizontal,
    RocketVertical,
    Bomb,
}

impl Bonus {
    /// Wire name (`NONE`, `ROCKET_H`, `ROCKET_V`, `BOMB`)
    pub fn name(&self) -> &'static str {
        match self {
            Bonus::None => "NONE",
            Bonus::RocketHorizontal => "ROCKET_H",
            Bonus::RocketVertical => "ROCKET_V",
            Bonus::Bomb => "BOMB",
        }
    }

    /// Parse a wire name
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(Bonus::None),
            "ROCKET_H" => Some(Bonus::RocketHorizontal),
            "ROCKET_V" => Some(Bonus::RocketVertical),
            "BOMB" => Some(Bonus::Bomb),
            _ => None,
        }
    }

    /// Board matrix letter for bonus tiles
    pub fn code(&self) -> Option<char> {
        match self {
            Bonus::None => None,
            Bonus::RocketHorizontal => Some('H'),
            Bonus::RocketVertical => Some('V'),
            Bonus::Bomb => Some('B'),
        }
    }

    /// Parse a bonus letter (case-insensitive)
    pub fn from_code(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'H' => Some(Bonus::RocketHorizontal),
            'V' => Some(Bonus::RocketVertical),
            'B' => Some(Bonus::Bomb),
            _ => None,
        }
    }

    pub fn is_some(&self) -> bool {
        !matches!(self, Bonus::None)
    }

    pub fn is_rocket(&self) -> bool {
        matches!(self, Bonus::RocketHorizontal | Bonus::RocketVertical)
    }
}

/// A grid position, `(row, col)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Check if the position lies on the board
    pub fn in_bounds(&self) -> bool {
        self.row < BOARD_ROWS && self.col < BOARD_COLS
    }

    /// Manhattan distance of exactly one
    pub fn is_adjacent(&self, other: Pos) -> bool {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col) == 1
    }
}

impl From<(usize, usize)> for Pos {
    fn from((row, col): (usize, usize)) -> Self {
        Self { row, col }
    }
}

/// A tile occupying one board cell
///
/// Tiles carry no coordinates; where a tile lives is answered by the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub color: Color,
    pub bonus: Bonus,
}

impl Tile {
    pub const fn new(color: Color, bonus: Bonus) -> Self {
        Self { color, bonus }
    }

    pub const fn plain(color: Color) -> Self {
        Self {
            color,
            bonus: Bonus::None,
        }
    }

    /// Board matrix code: color letter for plain tiles, bonus letter then
    /// color letter for bonus tiles (`HR`, `VO`, `BY`)
    pub fn code(&self) -> String {
        match self.bonus.code() {
            None => self.color.code().to_string(),
            Some(b) => {
                let mut s = String::with_capacity(2);
                s.push(b);
                s.push(self.color.code());
                s
            }
        }
    }

    /// Asset path advertised in spawned tile records
    pub fn image_path(&self) -> String {
        const ROOT: &str = "assets/elements";
        match self.bonus {
            Bonus::None => format!("{ROOT}/{}.png", self.color.as_str()),
            Bonus::Bomb => format!("{ROOT}/bomb.png"),
            Bonus::RocketHorizontal => format!("{ROOT}/rocket_h.png"),
            Bonus::RocketVertical => format!("{ROOT}/rocket_v.png"),
        }
    }
}

/// A board cell
///
/// - `None`: empty (only observable mid-resolution)
/// - `Some(Tile)`: occupied
pub type Cell = Option<Tile>;

/// Game mode, fixed at creation
///
/// - **Chess**: strict alternating turns
/// - **Time**: simultaneous race against a clock, every player may always act
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameMode {
    #[default]
    Chess,
    Time,
}

impl GameMode {
    /// Parse mode from its wire name
    ///
    /// ```
    /// use match3_duel_types::GameMode;
    ///
    /// assert_eq!(GameMode::from_str("chess"), Some(GameMode::Chess));
    /// assert_eq!(GameMode::from_str("Time"), Some(GameMode::Time));
    /// assert_eq!(GameMode::from_str("blitz"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "chess" => Some(GameMode::Chess),
            "time" => Some(GameMode::Time),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Chess => "chess",
            GameMode::Time => "time",
        }
    }
}

/// Tie-break policy for equal scores in time mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TieBreak {
    /// Equal scores end the game without a winner
    #[default]
    Draw,
    /// The player who finished first wins ties
    FirstFinisher,
}

impl TieBreak {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draw" => Some(TieBreak::Draw),
            "first_finisher" | "first" => Some(TieBreak::FirstFinisher),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TieBreak::Draw => "draw",
            TieBreak::FirstFinisher => "first_finisher",
        }
    }
}
