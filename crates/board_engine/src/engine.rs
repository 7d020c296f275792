//! Stateful engine wrapping the pure slide logic with tile spawning.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::slide::{self, Slide};
use crate::types::{
    Board, Direction, GameMode, ObstacleCell, BOARD_SIZE, DEFAULT_VICTORY_TILE, INITIAL_TILES,
};

/// Chance that a spawned tile is a 4 instead of a 2.
pub const FOUR_TILE_PROBABILITY: f64 = 0.1;

/// Outcome of applying a move to a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Board after the slide and, when the board changed, one spawned tile.
    pub board: Board,
    /// Sum of the tiles produced by merges during this move.
    pub score_gained: u32,
    /// False when the slide left the board unchanged; nothing was spawned.
    pub moved: bool,
}

/// Tile engine shared by every connection.
///
/// The random source sits behind a mutex so a single engine can be used from
/// many tasks. Seed it for reproducible sequences in tests.
pub struct TileEngine<R = StdRng> {
    rng: Mutex<R>,
    victory_tile: u32,
}

impl TileEngine<StdRng> {
    /// Engine seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    /// Engine with a fixed seed; identical seeds yield identical games.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> TileEngine<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
            victory_tile: DEFAULT_VICTORY_TILE,
        }
    }

    pub fn with_victory_tile(mut self, victory_tile: u32) -> Self {
        self.victory_tile = victory_tile;
        self
    }

    pub fn victory_tile(&self) -> u32 {
        self.victory_tile
    }

    /// Creates a fresh board for `mode` with two spawned tiles.
    ///
    /// Challenge boards get one obstacle chosen uniformly among all 16 cells
    /// before the initial tiles are placed.
    pub fn new_board(&self, mode: GameMode) -> (Board, Option<ObstacleCell>) {
        let mut rng = self.rng.lock();
        let obstacle = match mode {
            GameMode::Classic => None,
            GameMode::Challenge => ObstacleCell::new(
                rng.random_range(0..BOARD_SIZE),
                rng.random_range(0..BOARD_SIZE),
            ),
        };

        let mut board = Board::new();
        for _ in 0..INITIAL_TILES {
            spawn_tile(&mut *rng, &mut board, obstacle);
        }
        (board, obstacle)
    }

    /// Slides `board` and spawns a tile when anything moved.
    ///
    /// A move that changes nothing returns the input board untouched with
    /// `moved == false`; callers must not persist or count it.
    pub fn apply_move(
        &self,
        board: &Board,
        direction: Direction,
        obstacle: Option<ObstacleCell>,
    ) -> MoveOutcome {
        let Slide {
            mut board,
            score_gained,
            moved,
        } = slide::slide(board, direction, obstacle);

        if moved {
            spawn_tile(&mut *self.rng.lock(), &mut board, obstacle);
        }

        MoveOutcome {
            board,
            score_gained,
            moved,
        }
    }

    pub fn is_terminal(&self, board: &Board, obstacle: Option<ObstacleCell>) -> bool {
        slide::is_terminal(board, obstacle)
    }

    pub fn is_victory(&self, board: &Board) -> bool {
        slide::is_victory(board, self.victory_tile)
    }
}

/// Places a 2 (90%) or 4 (10%) on a uniformly chosen empty cell.
///
/// Returns the chosen cell, or `None` when the board has no room.
pub fn spawn_tile<R: Rng>(
    rng: &mut R,
    board: &mut Board,
    obstacle: Option<ObstacleCell>,
) -> Option<(usize, usize)> {
    let empty = board.empty_cells(obstacle);
    if empty.is_empty() {
        return None;
    }

    let (row, col) = empty[rng.random_range(0..empty.len())];
    let value = if rng.random_bool(FOUR_TILE_PROBABILITY) {
        4
    } else {
        2
    };
    board.set(row, col, value);
    Some((row, col))
}
