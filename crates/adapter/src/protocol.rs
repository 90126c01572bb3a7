//! Protocol module - JSON wire records exchanged between peers
//!
//! Every record is one line of UTF-8 JSON with a required `command` field.
//! The records here mirror the wire layout field for field; conversion to the
//! typed [`GameMessage`] validates every name, coordinate and board on the way
//! in, so a record that reaches the controller is always well formed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{BoardMatrix, BonusPlacement, Fall, MatrixError, Spawn};
use crate::engine::GameMessage;
use crate::types::{Bonus, Color, GameMode, Pos, Tile, DEFAULT_TIME_LIMIT_SECS};

/// Every command the protocol knows
pub const COMMANDS: [&str; 9] = [
    "start_game",
    "swap",
    "auto_swap",
    "auto_swap_circle",
    "board",
    "score",
    "time",
    "finish",
    "end_game",
];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("record has no command field")]
    MissingCommand,
    #[error("unknown cell code {0:?}")]
    BadCell(String),
    #[error("board has {rows} rows with widths {cols:?}")]
    BadBoardShape { rows: usize, cols: Vec<usize> },
    #[error("invalid {field}: {value:?}")]
    BadValue { field: &'static str, value: String },
}

impl From<MatrixError> for ProtocolError {
    fn from(err: MatrixError) -> Self {
        match err {
            MatrixError::BadCell(code) => ProtocolError::BadCell(code),
            MatrixError::BadShape { rows, cols, .. } => ProtocolError::BadBoardShape { rows, cols },
        }
    }
}

// ============== Record fragments ==============

/// `[row, col]`
pub type WireCell = [usize; 2];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBonus {
    pub r: usize,
    pub c: usize,
    pub bonus: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFall {
    pub old_r: usize,
    pub old_c: usize,
    pub new_r: usize,
    pub new_c: usize,
}

/// Spawned tile; `x` is the row and `y` the column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTile {
    pub x: usize,
    pub y: usize,
    pub color: String,
    pub bonus: String,
    #[serde(default)]
    pub img: String,
}

// ============== Records ==============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartGameRecord {
    pub mode: String,
    pub queue_players: Vec<String>,
    pub current_player: String,
    pub nicknames: Vec<String>,
    pub board: Vec<Vec<String>>,
    #[serde(default = "default_time_limit")]
    pub time_limit: u32,
}

fn default_time_limit() -> u32 {
    DEFAULT_TIME_LIMIT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub a_row: usize,
    pub a_col: usize,
    pub b_row: usize,
    pub b_col: usize,
    pub next_player: String,
    pub board: Vec<Vec<String>>,
    pub success: bool,
    #[serde(default)]
    pub removed: Vec<WireCell>,
    #[serde(default)]
    pub bonuses: Vec<WireBonus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSwapRecord {
    #[serde(default)]
    pub fallen: Vec<WireFall>,
    #[serde(default)]
    pub spawned: Vec<WireTile>,
    pub board: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSwapCircleRecord {
    #[serde(default)]
    pub fallen: Vec<WireFall>,
    #[serde(default)]
    pub removed: Vec<WireCell>,
    #[serde(default)]
    pub spawned: Vec<WireTile>,
    #[serde(default)]
    pub bonuses: Vec<WireBonus>,
    pub board: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub board: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndGameRecord {
    /// `null` on a draw
    pub winner: Option<String>,
    pub score: u32,
}

/// One wire record, discriminated by `command`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WireMessage {
    StartGame(StartGameRecord),
    Swap(SwapRecord),
    AutoSwap(AutoSwapRecord),
    AutoSwapCircle(AutoSwapCircleRecord),
    Board(BoardRecord),
    Score(ScoreRecord),
    Time(TimeRecord),
    Finish(ScoreRecord),
    EndGame(EndGameRecord),
}

impl WireMessage {
    pub fn command(&self) -> &'static str {
        match self {
            WireMessage::StartGame(_) => "start_game",
            WireMessage::Swap(_) => "swap",
            WireMessage::AutoSwap(_) => "auto_swap",
            WireMessage::AutoSwapCircle(_) => "auto_swap_circle",
            WireMessage::Board(_) => "board",
            WireMessage::Score(_) => "score",
            WireMessage::Time(_) => "time",
            WireMessage::Finish(_) => "finish",
            WireMessage::EndGame(_) => "end_game",
        }
    }
}

// ============== Parsing ==============

/// Decode and validate one line
pub fn parse_message(line: &str) -> Result<GameMessage, ProtocolError> {
    parse_record(line)?.try_into()
}

/// Decode one line into its raw record
pub fn parse_record(line: &str) -> Result<WireMessage, ProtocolError> {
    match serde_json::from_str::<WireMessage>(line) {
        Ok(msg) => Ok(msg),
        Err(e) => {
            // Tell a bad tag apart from a bad body.
            #[derive(Deserialize)]
            struct CommandOnly<'a> {
                #[serde(borrow)]
                command: Option<&'a str>,
            }
            let probe = serde_json::from_str::<CommandOnly>(line)?;
            match probe.command {
                None => Err(ProtocolError::MissingCommand),
                Some(cmd) if !COMMANDS.contains(&cmd) => {
                    Err(ProtocolError::UnknownCommand(cmd.to_string()))
                }
                Some(_) => Err(ProtocolError::Json(e)),
            }
        }
    }
}

/// Encode one message as a JSON line (without the trailing newline)
pub fn encode_message(msg: &GameMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&WireMessage::from(msg))?)
}

// ============== Conversions ==============

fn cell_to_pos([r, c]: WireCell) -> Result<Pos, ProtocolError> {
    checked_pos(r, c)
}

fn checked_pos(row: usize, col: usize) -> Result<Pos, ProtocolError> {
    let pos = Pos::new(row, col);
    if pos.in_bounds() {
        Ok(pos)
    } else {
        Err(ProtocolError::BadValue {
            field: "cell",
            value: format!("[{row}, {col}]"),
        })
    }
}

fn checked_board(rows: Vec<Vec<String>>) -> Result<BoardMatrix, ProtocolError> {
    let matrix = BoardMatrix::from(rows);
    matrix.decode()?;
    Ok(matrix)
}

fn parse_bonus(name: &str) -> Result<Bonus, ProtocolError> {
    Bonus::from_name(name).ok_or_else(|| ProtocolError::BadValue {
        field: "bonus",
        value: name.to_string(),
    })
}

fn parse_color(name: &str) -> Result<Color, ProtocolError> {
    Color::from_str(name).ok_or_else(|| ProtocolError::BadValue {
        field: "color",
        value: name.to_string(),
    })
}

fn positions(cells: Vec<WireCell>) -> Result<Vec<Pos>, ProtocolError> {
    cells.into_iter().map(cell_to_pos).collect()
}

fn bonuses(wire: Vec<WireBonus>) -> Result<Vec<BonusPlacement>, ProtocolError> {
    wire.into_iter()
        .map(|b| {
            Ok(BonusPlacement {
                pos: checked_pos(b.r, b.c)?,
                bonus: parse_bonus(&b.bonus)?,
            })
        })
        .collect()
}

fn falls(wire: Vec<WireFall>) -> Result<Vec<Fall>, ProtocolError> {
    wire.into_iter()
        .map(|f| {
            Ok(Fall {
                from: checked_pos(f.old_r, f.old_c)?,
                to: checked_pos(f.new_r, f.new_c)?,
            })
        })
        .collect()
}

fn spawns(wire: Vec<WireTile>) -> Result<Vec<Spawn>, ProtocolError> {
    wire.into_iter()
        .map(|t| {
            Ok(Spawn {
                pos: checked_pos(t.x, t.y)?,
                tile: Tile::new(parse_color(&t.color)?, parse_bonus(&t.bonus)?),
            })
        })
        .collect()
}

impl TryFrom<WireMessage> for GameMessage {
    type Error = ProtocolError;

    fn try_from(msg: WireMessage) -> Result<Self, Self::Error> {
        Ok(match msg {
            WireMessage::StartGame(r) => GameMessage::StartGame {
                mode: GameMode::from_str(&r.mode).ok_or(ProtocolError::BadValue {
                    field: "mode",
                    value: r.mode.clone(),
                })?,
                queue: r.queue_players,
                current: r.current_player,
                nicknames: r.nicknames,
                board: checked_board(r.board)?,
                time_limit: r.time_limit,
            },
            WireMessage::Swap(r) => GameMessage::Swap {
                a: checked_pos(r.a_row, r.a_col)?,
                b: checked_pos(r.b_row, r.b_col)?,
                next_player: r.next_player,
                board: checked_board(r.board)?,
                success: r.success,
                removed: positions(r.removed)?,
                bonuses: bonuses(r.bonuses)?,
            },
            WireMessage::AutoSwap(r) => GameMessage::AutoSwap {
                fallen: falls(r.fallen)?,
                spawned: spawns(r.spawned)?,
                board: checked_board(r.board)?,
            },
            WireMessage::AutoSwapCircle(r) => GameMessage::AutoSwapCircle {
                fallen: falls(r.fallen)?,
                removed: positions(r.removed)?,
                spawned: spawns(r.spawned)?,
                bonuses: bonuses(r.bonuses)?,
                board: checked_board(r.board)?,
            },
            WireMessage::Board(r) => GameMessage::Board {
                board: checked_board(r.board)?,
            },
            WireMessage::Score(r) => GameMessage::Score { score: r.score },
            WireMessage::Time(r) => GameMessage::Time { time: r.time },
            WireMessage::Finish(r) => GameMessage::Finish { score: r.score },
            WireMessage::EndGame(r) => GameMessage::EndGame {
                winner: r.winner,
                score: r.score,
            },
        })
    }
}

fn wire_cells(cells: &[Pos]) -> Vec<WireCell> {
    cells.iter().map(|p| [p.row, p.col]).collect()
}

fn wire_bonuses(bonuses: &[BonusPlacement]) -> Vec<WireBonus> {
    bonuses
        .iter()
        .map(|b| WireBonus {
            r: b.pos.row,
            c: b.pos.col,
            bonus: b.bonus.name().to_string(),
        })
        .collect()
}

fn wire_falls(fallen: &[Fall]) -> Vec<WireFall> {
    fallen
        .iter()
        .map(|f| WireFall {
            old_r: f.from.row,
            old_c: f.from.col,
            new_r: f.to.row,
            new_c: f.to.col,
        })
        .collect()
}

fn wire_tiles(spawned: &[Spawn]) -> Vec<WireTile> {
    spawned
        .iter()
        .map(|s| WireTile {
            x: s.pos.row,
            y: s.pos.col,
            color: s.tile.color.as_str().to_string(),
            bonus: s.tile.bonus.name().to_string(),
            img: s.tile.image_path(),
        })
        .collect()
}

impl From<&GameMessage> for WireMessage {
    fn from(msg: &GameMessage) -> Self {
        match msg {
            GameMessage::StartGame {
                mode,
                queue,
                current,
                nicknames,
                board,
                time_limit,
            } => WireMessage::StartGame(StartGameRecord {
                mode: mode.as_str().to_string(),
                queue_players: queue.clone(),
                current_player: current.clone(),
                nicknames: nicknames.clone(),
                board: board.rows().to_vec(),
                time_limit: *time_limit,
            }),
            GameMessage::Swap {
                a,
                b,
                next_player,
                board,
                success,
                removed,
                bonuses,
            } => WireMessage::Swap(SwapRecord {
                a_row: a.row,
                a_col: a.col,
                b_row: b.row,
                b_col: b.col,
                next_player: next_player.clone(),
                board: board.rows().to_vec(),
                success: *success,
                removed: wire_cells(removed),
                bonuses: wire_bonuses(bonuses),
            }),
            GameMessage::AutoSwap {
                fallen,
                spawned,
                board,
            } => WireMessage::AutoSwap(AutoSwapRecord {
                fallen: wire_falls(fallen),
                spawned: wire_tiles(spawned),
                board: board.rows().to_vec(),
            }),
            GameMessage::AutoSwapCircle {
                fallen,
                removed,
                spawned,
                bonuses,
                board,
            } => WireMessage::AutoSwapCircle(AutoSwapCircleRecord {
                fallen: wire_falls(fallen),
                removed: wire_cells(removed),
                spawned: wire_tiles(spawned),
                bonuses: wire_bonuses(bonuses),
                board: board.rows().to_vec(),
            }),
            GameMessage::Board { board } => WireMessage::Board(BoardRecord {
                board: board.rows().to_vec(),
            }),
            GameMessage::Score { score } => WireMessage::Score(ScoreRecord { score: *score }),
            GameMessage::Time { time } => WireMessage::Time(TimeRecord { time: *time }),
            GameMessage::Finish { score } => WireMessage::Finish(ScoreRecord { score: *score }),
            GameMessage::EndGame { winner, score } => WireMessage::EndGame(EndGameRecord {
                winner: winner.clone(),
                score: *score,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Board;

    fn board_json() -> String {
        serde_json::to_string(Board::new(5).to_matrix().rows()).unwrap()
    }

    #[test]
    fn test_parse_score() {
        let msg = parse_message(r#"{"command":"score","score":42}"#).unwrap();
        assert_eq!(msg, GameMessage::Score { score: 42 });
    }

    #[test]
    fn test_parse_end_game_draw() {
        let msg = parse_message(r#"{"command":"end_game","winner":null,"score":7}"#).unwrap();
        assert_eq!(
            msg,
            GameMessage::EndGame {
                winner: None,
                score: 7
            }
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        let err = parse_message(r#"{"command":"teleport","x":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(ref c) if c == "teleport"));
    }

    #[test]
    fn test_parse_missing_command() {
        let err = parse_message(r#"{"score":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingCommand));
    }

    #[test]
    fn test_parse_not_json() {
        let err = parse_message("WELCOME").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn test_parse_known_command_bad_body() {
        let err = parse_message(r#"{"command":"score","score":"lots"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn test_bad_board_is_rejected() {
        let line = r#"{"command":"board","board":[["R","Q"]]}"#;
        let err = parse_message(line).unwrap_err();
        assert!(matches!(err, ProtocolError::BadBoardShape { rows: 1, .. }));
    }

    #[test]
    fn test_bad_cell_code_is_rejected() {
        let mut rows = Board::new(5).to_matrix().into_rows();
        rows[3][3] = "Z".to_string();
        let line = format!(
            r#"{{"command":"board","board":{}}}"#,
            serde_json::to_string(&rows).unwrap()
        );
        let err = parse_message(&line).unwrap_err();
        assert!(matches!(err, ProtocolError::BadCell(ref c) if c == "Z"));
    }

    #[test]
    fn test_swap_record_fields() {
        let line = format!(
            r#"{{"command":"swap","a_row":2,"a_col":3,"b_row":2,"b_col":4,"next_player":"bob","board":{},"success":true,"removed":[[2,5],[2,6]],"bonuses":[{{"r":2,"c":4,"bonus":"ROCKET_V"}}]}}"#,
            board_json()
        );
        let GameMessage::Swap {
            a,
            b,
            next_player,
            removed,
            bonuses,
            ..
        } = parse_message(&line).unwrap()
        else {
            panic!("expected swap");
        };
        assert_eq!(a, Pos::new(2, 3));
        assert_eq!(b, Pos::new(2, 4));
        assert_eq!(next_player, "bob");
        assert_eq!(removed, vec![Pos::new(2, 5), Pos::new(2, 6)]);
        assert_eq!(
            bonuses,
            vec![BonusPlacement {
                pos: Pos::new(2, 4),
                bonus: Bonus::RocketVertical
            }]
        );
    }

    #[test]
    fn test_out_of_board_cell_is_rejected() {
        let line = format!(
            r#"{{"command":"auto_swap_circle","fallen":[],"removed":[[8,0]],"spawned":[],"bonuses":[],"board":{}}}"#,
            board_json()
        );
        let err = parse_message(&line).unwrap_err();
        assert!(matches!(err, ProtocolError::BadValue { field: "cell", .. }));
    }

    #[test]
    fn test_spawned_tile_layout() {
        let msg = GameMessage::AutoSwap {
            fallen: vec![Fall {
                from: Pos::new(0, 1),
                to: Pos::new(2, 1),
            }],
            spawned: vec![Spawn {
                pos: Pos::new(1, 5),
                tile: Tile::plain(Color::Yellow),
            }],
            board: Board::new(5).to_matrix(),
        };
        let line = encode_message(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["command"], "auto_swap");
        assert_eq!(value["fallen"][0]["old_r"], 0);
        assert_eq!(value["fallen"][0]["new_r"], 2);
        let tile = &value["spawned"][0];
        assert_eq!(tile["x"], 1);
        assert_eq!(tile["y"], 5);
        assert_eq!(tile["color"], "yellow");
        assert_eq!(tile["bonus"], "NONE");
        assert_eq!(tile["img"], "assets/elements/yellow.png");

        assert_eq!(parse_message(&line).unwrap(), msg);
    }

    #[test]
    fn test_start_game_encoding() {
        let msg = GameMessage::StartGame {
            mode: GameMode::Time,
            queue: vec!["b".into(), "a".into()],
            current: "b".into(),
            nicknames: vec!["a".into(), "b".into()],
            board: Board::new(9).to_matrix(),
            time_limit: 90,
        };
        let line = encode_message(&msg).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["command"], "start_game");
        assert_eq!(value["mode"], "time");
        assert_eq!(value["queue_players"][0], "b");
        assert_eq!(value["current_player"], "b");
        assert_eq!(value["time_limit"], 90);
        assert_eq!(value["board"].as_array().map(Vec::len), Some(8));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_start_game_without_time_limit_uses_default() {
        let line = format!(
            r#"{{"command":"start_game","mode":"chess","queue_players":["a"],"current_player":"a","nicknames":["a"],"board":{}}}"#,
            board_json()
        );
        let GameMessage::StartGame { time_limit, .. } = parse_message(&line).unwrap() else {
            panic!("expected start_game");
        };
        assert_eq!(time_limit, DEFAULT_TIME_LIMIT_SECS);
    }

    #[test]
    fn test_legacy_bonus_codes_accepted() {
        let mut rows = Board::new(5).to_matrix().into_rows();
        rows[0][0] = "H".to_string();
        rows[0][1] = "b".to_string();
        let line = format!(
            r#"{{"command":"board","board":{}}}"#,
            serde_json::to_string(&rows).unwrap()
        );
        assert!(parse_message(&line).is_ok());
    }
}
