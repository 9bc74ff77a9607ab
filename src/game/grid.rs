//! Grid geometry - positions, directions, free-cell search

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Resample budget for [`random_free_cell`]
pub const FREE_CELL_ATTEMPTS: usize = 100;

/// Cell coordinate on the square match grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Check that the cell lies within `[0, grid_size)²`
    pub fn in_bounds(&self, grid_size: i32) -> bool {
        self.x >= 0 && self.y >= 0 && self.x < grid_size && self.y < grid_size
    }

    /// Neighbouring cell in `dir`, or None when it falls off the grid
    pub fn step(&self, dir: Direction, grid_size: i32) -> Option<Position> {
        let (dx, dy) = dir.delta();
        let next = Position::new(self.x + dx, self.y + dy);
        next.in_bounds(grid_size).then_some(next)
    }
}

/// Manhattan distance between two cells
pub fn manhattan(a: Position, b: Position) -> i32 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

/// Movement direction. Humans may move in all eight, bots only along axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Direction {
    /// Axis-aligned moves, in tie-break order
    pub const CARDINAL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid delta; y grows downwards
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::UpLeft => (-1, -1),
            Direction::UpRight => (1, -1),
            Direction::DownLeft => (-1, 1),
            Direction::DownRight => (1, 1),
        }
    }
}

/// Pick a random cell not in `occupied`.
///
/// Gives up after [`FREE_CELL_ATTEMPTS`] samples and returns the last one,
/// which may be occupied. Callers that must not overlap check the result.
pub fn random_free_cell<R: Rng + ?Sized>(
    occupied: &HashSet<Position>,
    grid_size: i32,
    rng: &mut R,
) -> Position {
    let mut candidate = Position::new(0, 0);
    for _ in 0..FREE_CELL_ATTEMPTS {
        candidate = Position::new(rng.gen_range(0..grid_size), rng.gen_range(0..grid_size));
        if !occupied.contains(&candidate) {
            return candidate;
        }
    }
    candidate
}
