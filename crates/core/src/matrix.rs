//! Board matrix codec
//!
//! The matrix is the row-major text form of a board exchanged between peers:
//! one short string per cell.
//!
//! | code | meaning |
//! |------|---------|
//! | `.` | empty cell |
//! | `O` `P` `R` `Y` | plain orange / purple / red / yellow tile |
//! | `H?` `V?` `B?` | horizontal rocket / vertical rocket / bomb of color `?` |
//! | `H` `V` `B` | legacy bonus codes without a color |
//!
//! Legacy bonus codes decode to fixed colors (`H` red, `V` orange, `B` purple).
//! The encoder always writes the two-letter form so colors survive a round trip.

use thiserror::Error;

use crate::types::{Bonus, Cell, Color, Tile, BOARD_COLS, BOARD_ROWS};

/// Decoded grid, row-major
pub type Grid = [[Cell; BOARD_COLS]; BOARD_ROWS];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("unknown cell code {0:?}")]
    BadCell(String),
    #[error("board must be {expected_rows}x{expected_cols}, got {rows} rows (row widths {cols:?})")]
    BadShape {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: Vec<usize>,
    },
}

/// Row-major matrix of cell codes
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoardMatrix(pub Vec<Vec<String>>);

impl BoardMatrix {
    /// Encode a grid
    pub fn encode(grid: &Grid) -> Self {
        Self(
            grid.iter()
                .map(|row| row.iter().map(encode_cell).collect())
                .collect(),
        )
    }

    /// Decode into a grid, validating shape and every cell code
    pub fn decode(&self) -> Result<Grid, MatrixError> {
        let rows = &self.0;
        if rows.len() != BOARD_ROWS || rows.iter().any(|r| r.len() != BOARD_COLS) {
            return Err(MatrixError::BadShape {
                expected_rows: BOARD_ROWS,
                expected_cols: BOARD_COLS,
                rows: rows.len(),
                cols: rows.iter().map(Vec::len).collect(),
            });
        }

        let mut grid: Grid = [[None; BOARD_COLS]; BOARD_ROWS];
        for (r, row) in rows.iter().enumerate() {
            for (c, code) in row.iter().enumerate() {
                grid[r][c] = decode_cell(code)?;
            }
        }
        Ok(grid)
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.0
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.0
    }
}

impl From<Vec<Vec<String>>> for BoardMatrix {
    fn from(rows: Vec<Vec<String>>) -> Self {
        Self(rows)
    }
}

impl std::fmt::Display for BoardMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in &self.0 {
            for code in row {
                write!(f, "{code:<3}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

pub fn encode_cell(cell: &Cell) -> String {
    match cell {
        None => ".".to_string(),
        Some(tile) => tile.code(),
    }
}

pub fn decode_cell(code: &str) -> Result<Cell, MatrixError> {
    let bad = || MatrixError::BadCell(code.to_string());
    let mut chars = code.chars();
    let first = chars.next().ok_or_else(bad)?;
    let second = chars.next();
    if chars.next().is_some() {
        return Err(bad());
    }

    if first == '.' {
        return if second.is_none() { Ok(None) } else { Err(bad()) };
    }

    // Plain colors are checked first: `B` is a bonus, never a color letter.
    if let (Some(color), None) = (Color::from_code(first), second) {
        return Ok(Some(Tile::plain(color)));
    }

    let bonus = Bonus::from_code(first).ok_or_else(bad)?;
    let color = match second {
        Some(c) => Color::from_code(c).ok_or_else(bad)?,
        None => legacy_bonus_color(bonus),
    };
    Ok(Some(Tile::new(color, bonus)))
}

fn legacy_bonus_color(bonus: Bonus) -> Color {
    match bonus {
        Bonus::RocketHorizontal => Color::Red,
        Bonus::RocketVertical => Color::Orange,
        Bonus::Bomb | Bonus::None => Color::Purple,
    }
}
