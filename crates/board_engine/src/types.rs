//! Core board types shared by the engine and its callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width and height of the square board.
pub const BOARD_SIZE: usize = 4;

/// Tile value that wins the game: two 8192 tiles merged.
pub const DEFAULT_VICTORY_TILE: u32 = 16384;

/// Number of tiles placed on a fresh board.
pub const INITIAL_TILES: usize = 2;

/// Errors produced when parsing protocol-level enum values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    #[error("invalid game mode: {0}")]
    InvalidGameMode(String),
}

/// Direction of travel for a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All four directions, in the order terminal checks try them.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            other => Err(ParseError::InvalidDirection(other.to_string())),
        }
    }
}

/// Game variant selected when a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Plain 4x4 board.
    #[default]
    Classic,
    /// One cell is permanently disabled and acts as a wall.
    Challenge,
}

impl GameMode {
    pub const ALL: [GameMode; 2] = [GameMode::Classic, GameMode::Challenge];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Challenge => "challenge",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classic" => Ok(GameMode::Classic),
            "challenge" => Ok(GameMode::Challenge),
            other => Err(ParseError::InvalidGameMode(other.to_string())),
        }
    }
}

/// The disabled cell of a challenge-mode board.
///
/// Never receives a spawned tile and splits its row and column into two
/// independent segments during a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObstacleCell {
    pub row: usize,
    pub col: usize,
}

impl ObstacleCell {
    /// Returns `None` when the coordinate lies outside the board.
    pub fn new(row: usize, col: usize) -> Option<Self> {
        (row < BOARD_SIZE && col < BOARD_SIZE).then_some(Self { row, col })
    }

    pub fn is_at(&self, row: usize, col: usize) -> bool {
        self.row == row && self.col == col
    }
}

/// A 4x4 grid of tile values, row-major. Zero marks an empty cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board([[u32; BOARD_SIZE]; BOARD_SIZE]);

impl Board {
    /// An empty board.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: [[u32; BOARD_SIZE]; BOARD_SIZE]) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[[u32; BOARD_SIZE]; BOARD_SIZE] {
        &self.0
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.0[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: u32) {
        self.0[row][col] = value;
    }

    /// Empty cells in row-major order, skipping the obstacle if any.
    pub fn empty_cells(&self, obstacle: Option<ObstacleCell>) -> Vec<(usize, usize)> {
        let mut cells = Vec::with_capacity(BOARD_SIZE * BOARD_SIZE);
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                if self.0[row][col] != 0 {
                    continue;
                }
                if obstacle.is_some_and(|cell| cell.is_at(row, col)) {
                    continue;
                }
                cells.push((row, col));
            }
        }
        cells
    }

    /// True when no playable cell is empty.
    pub fn is_full(&self, obstacle: Option<ObstacleCell>) -> bool {
        self.empty_cells(obstacle).is_empty()
    }

    pub fn contains(&self, value: u32) -> bool {
        self.0.iter().flatten().any(|&tile| tile == value)
    }

    pub fn tile_count(&self) -> usize {
        self.0.iter().flatten().filter(|&&tile| tile != 0).count()
    }

    pub fn max_tile(&self) -> u32 {
        self.0.iter().flatten().copied().max().unwrap_or(0)
    }
}

impl From<[[u32; BOARD_SIZE]; BOARD_SIZE]> for Board {
    fn from(rows: [[u32; BOARD_SIZE]; BOARD_SIZE]) -> Self {
        Self::from_rows(rows)
    }
}
