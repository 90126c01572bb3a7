//! Board module - the match-3 grid engine
//!
//! The board is an 8x7 grid where each cell can be empty or hold a tile.
//! Coordinates: `Pos { row, col }` with row 0 at the top and col 0 at the left.
//!
//! The grid is the only record of where a tile is. Tiles carry color and bonus
//! but no coordinates, so a fall or swap only ever rewrites grid slots.
//!
//! Every public mutation leaves the board either stable and playable (no runs,
//! at least one legal swap) or holding the result of a finished transaction
//! for the caller to resolve with [`Board::collapse_and_fill`] and
//! [`Board::get_auto_matched`].

use std::collections::BTreeSet;

use arrayvec::ArrayVec;
use tracing::debug;

use crate::matrix::{BoardMatrix, Grid, MatrixError};
use crate::rng::SimpleRng;
use crate::types::{
    Bonus, Cell, Color, Pos, Tile, BOARD_COLS, BOARD_ROWS, BOMB_RUN, MIN_RUN, ROCKET_RUN,
};

/// A maximal same-color line of cells (at most one column tall)
type Run = ArrayVec<Pos, BOARD_ROWS>;

/// A bonus tile created by a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BonusPlacement {
    pub pos: Pos,
    pub bonus: Bonus,
}

/// Result of [`Board::swap`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SwapOutcome {
    pub success: bool,
    /// Cells cleared by the swap
    pub removed: BTreeSet<Pos>,
    /// Tiles promoted to bonuses; never part of `removed`
    pub bonuses: Vec<BonusPlacement>,
    /// Set when the swap fired a bonus instead of matching
    pub triggered: Option<Pos>,
}

impl SwapOutcome {
    fn rejected() -> Self {
        Self::default()
    }
}

/// Result of [`Board::get_auto_matched`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchOutcome {
    pub removed: BTreeSet<Pos>,
    pub bonuses: Vec<BonusPlacement>,
}

/// A tile that moved down during collapse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fall {
    pub from: Pos,
    pub to: Pos,
}

/// A tile created during refill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Spawn {
    pub pos: Pos,
    pub tile: Tile,
}

/// Result of [`Board::collapse_and_fill`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Refill {
    pub fallen: Vec<Fall>,
    pub spawned: Vec<Spawn>,
}

/// Which cell of a long run becomes the bonus tile
#[derive(Debug, Clone, Copy)]
enum Promotion {
    /// Prefer a swap endpoint inside the run, else the middle
    Swapped(Pos, Pos),
    /// Uniform pick (spontaneous cascades)
    Random,
}

/// The game board - 8 rows x 7 columns
#[derive(Debug, Clone)]
pub struct Board {
    cells: Grid,
    rng: SimpleRng,
}

impl PartialEq for Board {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}

impl Board {
    /// Create a stable, playable board
    ///
    /// Fills every cell with a random color and retries until the fill has
    /// no run and at least one legal swap.
    pub fn new(seed: u32) -> Self {
        let mut board = Self {
            cells: [[None; BOARD_COLS]; BOARD_ROWS],
            rng: SimpleRng::new(seed),
        };
        board.fill_start_board();
        board
    }

    /// Create a board from explicit cells (no stability check)
    pub fn from_cells(cells: Grid, seed: u32) -> Self {
        Self {
            cells,
            rng: SimpleRng::new(seed),
        }
    }

    /// Create a board from a peer's matrix
    pub fn from_matrix(matrix: &BoardMatrix, seed: u32) -> Result<Self, MatrixError> {
        Ok(Self::from_cells(matrix.decode()?, seed))
    }

    /// Replace every cell from a peer's matrix, keeping this board's RNG
    pub fn replace_from_matrix(&mut self, matrix: &BoardMatrix) -> Result<(), MatrixError> {
        self.cells = matrix.decode()?;
        Ok(())
    }

    pub fn to_matrix(&self) -> BoardMatrix {
        BoardMatrix::encode(&self.cells)
    }

    pub fn rows(&self) -> usize {
        BOARD_ROWS
    }

    pub fn cols(&self) -> usize {
        BOARD_COLS
    }

    /// Get cell at `pos`; out of bounds reads as empty
    pub fn get(&self, pos: Pos) -> Cell {
        if !pos.in_bounds() {
            return None;
        }
        self.cells[pos.row][pos.col]
    }

    /// Set cell at `pos`
    /// Returns false if out of bounds
    pub fn set(&mut self, pos: Pos, cell: Cell) -> bool {
        if !pos.in_bounds() {
            return false;
        }
        self.cells[pos.row][pos.col] = cell;
        true
    }

    pub fn cells(&self) -> &Grid {
        &self.cells
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().flatten().all(Option::is_some)
    }

    /// Swap two 4-adjacent cells and resolve the immediate outcome.
    ///
    /// Callers validate adjacency. A bonus tile at either end fires instead of
    /// matching. Without a resulting run the swap is reverted and reported as
    /// unsuccessful, leaving the board untouched.
    pub fn swap(&mut self, a: Pos, b: Pos) -> SwapOutcome {
        if self.get(a).is_none() || self.get(b).is_none() {
            return SwapOutcome::rejected();
        }

        self.swap_cells(a, b);

        for pos in [a, b] {
            if self.get(pos).is_some_and(|t| t.bonus.is_some()) {
                let removed = self.trigger_bonus(pos);
                return SwapOutcome {
                    success: true,
                    removed,
                    bonuses: Vec::new(),
                    triggered: Some(pos),
                };
            }
        }

        if !any_run_through(&self.cells, &[a, b]) {
            self.swap_cells(a, b);
            return SwapOutcome::rejected();
        }

        let MatchOutcome { removed, bonuses } = self.resolve_matches(Promotion::Swapped(a, b));
        SwapOutcome {
            success: true,
            removed,
            bonuses,
            triggered: None,
        }
    }

    /// Fire the bonus at `pos` and clear every cell it hits.
    ///
    /// - Bomb: the 3x3 neighborhood, clipped to the board
    /// - Horizontal rocket: its row, columns `0..col`
    /// - Vertical rocket: its column, rows `0..row`
    ///
    /// The firing cell is always included. A position off the board clears
    /// nothing.
    pub fn trigger_bonus(&mut self, pos: Pos) -> BTreeSet<Pos> {
        let mut removed = BTreeSet::new();
        if !pos.in_bounds() {
            return removed;
        }
        let bonus = self.get(pos).map(|t| t.bonus).unwrap_or_default();
        debug!(row = pos.row, col = pos.col, bonus = bonus.name(), "bonus triggered");

        match bonus {
            Bonus::Bomb => {
                for r in pos.row.saturating_sub(1)..=(pos.row + 1).min(BOARD_ROWS - 1) {
                    for c in pos.col.saturating_sub(1)..=(pos.col + 1).min(BOARD_COLS - 1) {
                        removed.insert(Pos::new(r, c));
                    }
                }
            }
            Bonus::RocketHorizontal => {
                removed.extend((0..pos.col).map(|c| Pos::new(pos.row, c)));
            }
            Bonus::RocketVertical => {
                removed.extend((0..pos.row).map(|r| Pos::new(r, pos.col)));
            }
            Bonus::None => {}
        }

        removed.insert(pos);
        for p in &removed {
            self.cells[p.row][p.col] = None;
        }
        removed
    }

    /// Apply gravity, then refill every empty cell.
    ///
    /// Columns compact downward preserving tile order; new plain tiles fill
    /// the gaps column by column, top to bottom. If the refilled board has no
    /// legal swap, random tiles are recolored until it does.
    pub fn collapse_and_fill(&mut self) -> Refill {
        let mut refill = Refill::default();

        for c in 0..BOARD_COLS {
            let mut write = BOARD_ROWS;
            for read in (0..BOARD_ROWS).rev() {
                if let Some(tile) = self.cells[read][c] {
                    write -= 1;
                    if read != write {
                        self.cells[write][c] = Some(tile);
                        self.cells[read][c] = None;
                        refill.fallen.push(Fall {
                            from: Pos::new(read, c),
                            to: Pos::new(write, c),
                        });
                    }
                }
            }
        }

        for c in 0..BOARD_COLS {
            for r in 0..BOARD_ROWS {
                if self.cells[r][c].is_none() {
                    let tile = Tile::plain(self.random_color());
                    self.cells[r][c] = Some(tile);
                    refill.spawned.push(Spawn {
                        pos: Pos::new(r, c),
                        tile,
                    });
                }
            }
        }

        while !self.has_move() {
            self.recolor_random_tile();
        }

        refill
    }

    /// Whether any run of three or more currently exists
    pub fn step(&self) -> bool {
        !collect_runs(&self.cells).is_empty()
    }

    /// Clear runs that appeared on their own after a refill.
    ///
    /// Same contract as the matching half of [`Board::swap`], except that the
    /// promoted cell of a long run is picked uniformly.
    pub fn get_auto_matched(&mut self) -> MatchOutcome {
        self.resolve_matches(Promotion::Random)
    }

    /// Whether some adjacent swap would create a run
    pub fn has_move(&self) -> bool {
        let mut scratch = self.cells;
        for r in 0..BOARD_ROWS {
            for c in 0..BOARD_COLS {
                let here = Pos::new(r, c);
                if c + 1 < BOARD_COLS && will_match(&mut scratch, here, Pos::new(r, c + 1)) {
                    return true;
                }
                if r + 1 < BOARD_ROWS && will_match(&mut scratch, here, Pos::new(r + 1, c)) {
                    return true;
                }
            }
        }
        false
    }

    /// Every cell that belongs to a run of three or more
    pub fn matched_cells(&self) -> BTreeSet<Pos> {
        collect_runs(&self.cells).into_iter().flatten().collect()
    }

    fn fill_start_board(&mut self) {
        loop {
            for r in 0..BOARD_ROWS {
                for c in 0..BOARD_COLS {
                    self.cells[r][c] = Some(Tile::plain(self.random_color()));
                }
            }
            if !self.step() && self.has_move() {
                break;
            }
        }
    }

    fn resolve_matches(&mut self, promotion: Promotion) -> MatchOutcome {
        let runs = collect_runs(&self.cells);
        let matched: BTreeSet<Pos> = runs.iter().flatten().copied().collect();

        let mut bonuses: Vec<BonusPlacement> = Vec::new();
        for run in runs.iter().filter(|run| run.len() >= ROCKET_RUN) {
            let target = match promotion {
                Promotion::Swapped(a, b) => [a, b]
                    .into_iter()
                    .find(|p| run.contains(p))
                    .unwrap_or(run[run.len() / 2]),
                Promotion::Random => self.rng.choose(run).unwrap_or(run[run.len() / 2]),
            };
            let bonus = if run.len() >= BOMB_RUN {
                Bonus::Bomb
            } else if self.rng.next_bool() {
                Bonus::RocketHorizontal
            } else {
                Bonus::RocketVertical
            };

            if let Some(tile) = self.cells[target.row][target.col].as_mut() {
                tile.bonus = bonus;
            }
            // A cell shared by a row run and a column run keeps the later promotion.
            bonuses.retain(|b| b.pos != target);
            bonuses.push(BonusPlacement {
                pos: target,
                bonus,
            });
        }

        let removed: BTreeSet<Pos> = matched
            .into_iter()
            .filter(|p| !bonuses.iter().any(|b| b.pos == *p))
            .collect();
        for p in &removed {
            self.cells[p.row][p.col] = None;
        }

        MatchOutcome { removed, bonuses }
    }

    fn recolor_random_tile(&mut self) {
        let r = self.rng.next_range(BOARD_ROWS as u32) as usize;
        let c = self.rng.next_range(BOARD_COLS as u32) as usize;
        let Some(current) = self.cells[r][c].map(|t| t.color) else {
            return;
        };
        let others: ArrayVec<Color, 4> = Color::ALL
            .into_iter()
            .filter(|&color| color != current)
            .collect();
        if let (Some(color), Some(tile)) = (self.rng.choose(&others), self.cells[r][c].as_mut()) {
            debug!(row = r, col = c, color = color.as_str(), "no legal move, recolored tile");
            tile.color = color;
        }
    }

    fn random_color(&mut self) -> Color {
        self.rng.choose(&Color::ALL).unwrap_or(Color::Red)
    }

    fn swap_cells(&mut self, a: Pos, b: Pos) {
        let tmp = self.cells[a.row][a.col];
        self.cells[a.row][a.col] = self.cells[b.row][b.col];
        self.cells[b.row][b.col] = tmp;
    }
}

fn color_at(grid: &Grid, r: usize, c: usize) -> Option<Color> {
    grid[r][c].map(|t| t.color)
}

/// Length of the same-color line through `pos` along one axis
fn line_length(grid: &Grid, pos: Pos, horizontal: bool) -> usize {
    let Some(color) = color_at(grid, pos.row, pos.col) else {
        return 0;
    };
    let same = |r: usize, c: usize| color_at(grid, r, c) == Some(color);

    let mut count = 1;
    if horizontal {
        count += (pos.col + 1..BOARD_COLS)
            .take_while(|&c| same(pos.row, c))
            .count();
        count += (0..pos.col).rev().take_while(|&c| same(pos.row, c)).count();
    } else {
        count += (pos.row + 1..BOARD_ROWS)
            .take_while(|&r| same(r, pos.col))
            .count();
        count += (0..pos.row).rev().take_while(|&r| same(r, pos.col)).count();
    }
    count
}

fn any_run_through(grid: &Grid, cells: &[Pos]) -> bool {
    cells
        .iter()
        .any(|&p| line_length(grid, p, true) >= MIN_RUN || line_length(grid, p, false) >= MIN_RUN)
}

fn will_match(grid: &mut Grid, a: Pos, b: Pos) -> bool {
    let swap = |g: &mut Grid| {
        let tmp = g[a.row][a.col];
        g[a.row][a.col] = g[b.row][b.col];
        g[b.row][b.col] = tmp;
    };
    swap(grid);
    let ok = any_run_through(grid, &[a, b]);
    swap(grid);
    ok
}

/// All maximal runs of length >= 3, rows first then columns
fn collect_runs(grid: &Grid) -> Vec<Run> {
    let mut runs = Vec::new();

    let mut scan = |line: &mut dyn Iterator<Item = Pos>| {
        let mut run = Run::new();
        let mut run_color = None;
        for p in line {
            let color = color_at(grid, p.row, p.col);
            if color.is_some() && color == run_color {
                run.push(p);
                continue;
            }
            if run.len() >= MIN_RUN {
                runs.push(run.clone());
            }
            run.clear();
            run_color = color;
            if color.is_some() {
                run.push(p);
            }
        }
        if run.len() >= MIN_RUN {
            runs.push(run);
        }
    };

    for r in 0..BOARD_ROWS {
        scan(&mut (0..BOARD_COLS).map(|c| Pos::new(r, c)));
    }
    for c in 0..BOARD_COLS {
        scan(&mut (0..BOARD_ROWS).map(|r| Pos::new(r, c)));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Checkerboard-like fill with no runs anywhere: rows alternate two colors,
    /// columns step through all four.
    fn quiet_grid() -> Grid {
        let mut grid: Grid = [[None; BOARD_COLS]; BOARD_ROWS];
        for (r, row) in grid.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = Some(Tile::plain(Color::ALL[(r + 2 * c) % 4]));
            }
        }
        grid
    }

    fn paint(grid: &mut Grid, cells: &[(usize, usize)], color: Color) {
        for &(r, c) in cells {
            grid[r][c] = Some(Tile::plain(color));
        }
    }

    #[test]
    fn test_quiet_grid_has_no_runs() {
        let board = Board::from_cells(quiet_grid(), 1);
        assert!(!board.step());
    }

    #[test]
    fn test_collect_runs_row_and_column() {
        let mut grid = quiet_grid();
        grid[0][0] = None;
        paint(&mut grid, &[(5, 1), (5, 2), (5, 3)], Color::Orange);
        let runs = collect_runs(&grid);
        assert!(runs
            .iter()
            .any(|r| r.as_slice() == [Pos::new(5, 1), Pos::new(5, 2), Pos::new(5, 3)]));
    }

    #[test]
    fn test_line_length_counts_both_directions() {
        let mut grid = quiet_grid();
        paint(&mut grid, &[(2, 0), (2, 1), (2, 2), (2, 3)], Color::Yellow);
        assert_eq!(line_length(&grid, Pos::new(2, 1), true), 4);
        assert_eq!(line_length(&grid, Pos::new(2, 3), true), 4);
    }

    #[test]
    fn test_empty_cells_never_match() {
        let mut grid = quiet_grid();
        for c in 0..BOARD_COLS {
            grid[0][c] = None;
        }
        assert!(collect_runs(&grid).is_empty());
    }

    #[test]
    fn test_swap_with_empty_cell_is_rejected() {
        let mut grid = quiet_grid();
        grid[0][0] = None;
        let mut board = Board::from_cells(grid, 1);
        let before = *board.cells();
        let out = board.swap(Pos::new(0, 0), Pos::new(0, 1));
        assert!(!out.success);
        assert_eq!(*board.cells(), before);
    }

    #[test]
    fn test_promotion_prefers_swapped_cell() {
        // Row 4: Y Y . Y Y with a yellow above the gap; swapping it down makes
        // a run of five, promoted at the swapped cell.
        let mut grid = quiet_grid();
        paint(&mut grid, &[(4, 0), (4, 1), (4, 3), (4, 4)], Color::Yellow);
        paint(&mut grid, &[(4, 2)], Color::Purple);
        paint(&mut grid, &[(3, 2)], Color::Yellow);
        let mut board = Board::from_cells(grid, 9);

        let out = board.swap(Pos::new(3, 2), Pos::new(4, 2));
        assert!(out.success);
        assert_eq!(
            out.bonuses,
            vec![BonusPlacement {
                pos: Pos::new(4, 2),
                bonus: Bonus::Bomb
            }]
        );
        assert!(!out.removed.contains(&Pos::new(4, 2)));
        assert_eq!(
            board.get(Pos::new(4, 2)),
            Some(Tile::new(Color::Yellow, Bonus::Bomb))
        );
    }

    #[test]
    fn test_auto_match_promotes_inside_run() {
        let mut grid = quiet_grid();
        paint(&mut grid, &[(7, 0), (7, 1), (7, 2), (7, 3)], Color::Red);
        let mut board = Board::from_cells(grid, 4);

        let out = board.get_auto_matched();
        assert_eq!(out.bonuses.len(), 1);
        let placed = out.bonuses[0];
        assert_eq!(placed.pos.row, 7);
        assert!(placed.pos.col <= 3);
        assert!(placed.bonus.is_rocket());
        assert_eq!(out.removed.len(), 3);
    }

    #[test]
    fn test_trigger_off_board_clears_nothing() {
        let mut board = Board::from_cells(quiet_grid(), 2);
        let before = *board.cells();
        assert!(board.trigger_bonus(Pos::new(8, 0)).is_empty());
        assert!(board.trigger_bonus(Pos::new(0, 7)).is_empty());
        assert_eq!(*board.cells(), before);
    }
}
