#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{vec::Vec};

use core::fmt;

use serde::{Deserialize, Serialize};

// Cell codes shared with the model collaborator.
// The board itself carries 0..=3; CURSOR appears only in model input.
pub const OPEN: u8 = 0;
pub const WALL: u8 = 1;
pub const START: u8 = 2;
pub const END: u8 = 3;
pub const CURSOR: u8 = 4;

/// Grid coordinate, (row, col) with row 0 at the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub row: u32,
    pub col: u32,
}

impl Coord {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    #[must_use]
    pub fn manhattan(self, other: Coord) -> u32 {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The four cardinal moves.
///
/// The index order (up, down, left, right) is fixed: a direction-scored
/// collaborator emits one score per index in exactly this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    Empty,
    Ragged {
        row: usize,
        expected: usize,
        got: usize,
    },
    UnknownCode {
        row: usize,
        col: usize,
        code: u8,
    },
    MissingStart,
    MissingEnd,
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::Empty => write!(f, "board has no cells"),
            BoardError::Ragged { row, expected, got } => {
                write!(f, "row {row} has {got} cells, expected {expected}")
            }
            BoardError::UnknownCode { row, col, code } => {
                write!(f, "unknown cell code {code} at ({row}, {col})")
            }
            BoardError::MissingStart => write!(f, "board has no start cell"),
            BoardError::MissingEnd => write!(f, "board has no end cell"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BoardError {}

/// 2D grid of cell codes, stored flat row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    w: u32,
    h: u32,
    cells: Vec<u8>,
}

impl Board {
    /// Build from nested rows, validating rectangularity and cell codes.
    /// `CURSOR` is rejected here: it is a solver-internal marker, never part
    /// of a caller-supplied board.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self, BoardError> {
        let h = rows.len();
        let w = rows.first().map(|r| r.len()).unwrap_or(0);
        if h == 0 || w == 0 {
            return Err(BoardError::Empty);
        }
        let mut cells = Vec::with_capacity(w * h);
        for (r, row) in rows.iter().enumerate() {
            if row.len() != w {
                return Err(BoardError::Ragged {
                    row: r,
                    expected: w,
                    got: row.len(),
                });
            }
            for (c, &code) in row.iter().enumerate() {
                if code > END {
                    return Err(BoardError::UnknownCode { row: r, col: c, code });
                }
                cells.push(code);
            }
        }
        Ok(Self {
            w: w as u32,
            h: h as u32,
            cells,
        })
    }

    #[must_use]
    pub fn w(&self) -> u32 {
        self.w
    }

    #[must_use]
    pub fn h(&self) -> u32 {
        self.h
    }

    /// Total cell count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Flat row-major index of a coordinate.
    #[inline]
    pub fn cell_index(&self, c: Coord) -> usize {
        (c.row as usize) * (self.w as usize) + (c.col as usize)
    }

    pub fn code(&self, c: Coord) -> u8 {
        self.cells[self.cell_index(c)]
    }

    pub fn is_wall(&self, c: Coord) -> bool {
        self.code(c) == WALL
    }

    /// One step from `from`; `None` when it would leave the grid.
    pub fn step(&self, from: Coord, dir: Direction) -> Option<Coord> {
        let (dr, dc) = dir.delta();
        let row = from.row as i64 + dr as i64;
        let col = from.col as i64 + dc as i64;
        if row < 0 || col < 0 || row >= self.h as i64 || col >= self.w as i64 {
            return None;
        }
        Some(Coord::new(row as u32, col as u32))
    }

    /// Last start-coded cell in row-major scan order, if any.
    pub fn find_start(&self) -> Option<Coord> {
        self.find_code(START)
    }

    /// Last end-coded cell in row-major scan order, if any.
    pub fn find_end(&self) -> Option<Coord> {
        self.find_code(END)
    }

    fn find_code(&self, code: u8) -> Option<Coord> {
        let mut found = None;
        for (i, &cell) in self.cells.iter().enumerate() {
            if cell == code {
                found = Some(Coord::new(
                    (i / self.w as usize) as u32,
                    (i % self.w as usize) as u32,
                ));
            }
        }
        found
    }

    /// Start and end markers; a board without both is invalid input.
    pub fn markers(&self) -> Result<(Coord, Coord), BoardError> {
        let start = self.find_start().ok_or(BoardError::MissingStart)?;
        let end = self.find_end().ok_or(BoardError::MissingEnd)?;
        Ok((start, end))
    }

    /// Flattened model input: the board's codes row-major, no cursor marker.
    pub fn tokens(&self) -> Vec<u32> {
        self.cells.iter().map(|&c| c as u32).collect()
    }

    /// Flattened model input: the board's codes with `cursor` overwritten by
    /// the current-position marker. Applied last, so a cursor sitting on the
    /// start or end cell masks that marker, matching the collaborator's
    /// training encoding.
    pub fn tokens_with_cursor(&self, cursor: Coord) -> Vec<u32> {
        let mut tokens = self.tokens();
        tokens[self.cell_index(cursor)] = CURSOR as u32;
        tokens
    }

    /// Nested-row copy for JSON-facing payloads.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        (0..self.h as usize)
            .map(|r| self.cells[r * self.w as usize..(r + 1) * self.w as usize].to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_board() -> Board {
        Board::from_rows(&[
            vec![0, 0, 1, 0],
            vec![2, 0, 1, 0],
            vec![0, 0, 0, 3],
            vec![0, 1, 0, 0],
        ])
        .unwrap()
    }

    #[test]
    fn markers_are_located() {
        let board = spec_board();
        let (start, end) = board.markers().unwrap();
        assert_eq!(start, Coord::new(1, 0));
        assert_eq!(end, Coord::new(2, 3));
    }

    #[test]
    fn missing_markers_are_invalid_input() {
        let board = Board::from_rows(&[vec![0, 0], vec![0, 3]]).unwrap();
        assert_eq!(board.markers().unwrap_err(), BoardError::MissingStart);
        let board = Board::from_rows(&[vec![2, 0], vec![0, 0]]).unwrap();
        assert_eq!(board.markers().unwrap_err(), BoardError::MissingEnd);
    }

    #[test]
    fn duplicate_markers_resolve_to_last_occurrence() {
        let board = Board::from_rows(&[vec![2, 2], vec![3, 3]]).unwrap();
        let (start, end) = board.markers().unwrap();
        assert_eq!(start, Coord::new(0, 1));
        assert_eq!(end, Coord::new(1, 1));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Board::from_rows(&[vec![0, 0], vec![0]]).unwrap_err();
        assert_eq!(
            err,
            BoardError::Ragged {
                row: 1,
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn cursor_code_is_rejected_in_input() {
        let err = Board::from_rows(&[vec![0, 4]]).unwrap_err();
        assert_eq!(
            err,
            BoardError::UnknownCode {
                row: 0,
                col: 1,
                code: 4
            }
        );
    }

    #[test]
    fn empty_board_is_rejected() {
        assert_eq!(Board::from_rows(&[]).unwrap_err(), BoardError::Empty);
    }

    #[test]
    fn step_respects_grid_bounds() {
        let board = spec_board();
        assert_eq!(board.step(Coord::new(0, 0), Direction::Up), None);
        assert_eq!(board.step(Coord::new(0, 0), Direction::Left), None);
        assert_eq!(
            board.step(Coord::new(0, 0), Direction::Down),
            Some(Coord::new(1, 0))
        );
        assert_eq!(board.step(Coord::new(3, 3), Direction::Down), None);
        assert_eq!(board.step(Coord::new(3, 3), Direction::Right), None);
    }

    #[test]
    fn tokens_mark_the_cursor_last() {
        let board = spec_board();
        let tokens = board.tokens_with_cursor(Coord::new(0, 0));
        assert_eq!(tokens.len(), 16);
        assert_eq!(tokens[0], CURSOR as u32);
        // Start/end markers survive at their flat indices.
        assert_eq!(tokens[4], START as u32);
        assert_eq!(tokens[11], END as u32);

        // A cursor on the start cell masks the start marker.
        let tokens = board.tokens_with_cursor(Coord::new(1, 0));
        assert_eq!(tokens[4], CURSOR as u32);
    }

    #[test]
    fn manhattan_distance_is_symmetric() {
        let a = Coord::new(1, 0);
        let b = Coord::new(2, 3);
        assert_eq!(a.manhattan(b), 4);
        assert_eq!(b.manhattan(a), 4);
    }
}
