//! # Board Engine
//!
//! Move resolution for the 4x4 sliding-tile puzzle: compaction, merging,
//! random tile spawning, terminal and victory detection.
//!
//! The crate has no I/O. The only state is the random source inside
//! [`TileEngine`], which callers seed for reproducible games.
//!
//! ```
//! use board_engine::{Board, Direction, TileEngine};
//!
//! let engine = TileEngine::from_seed(7);
//! let board = Board::from_rows([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
//! let outcome = engine.apply_move(&board, Direction::Left, None);
//!
//! assert!(outcome.moved);
//! assert_eq!(outcome.score_gained, 4);
//! assert_eq!(outcome.board.get(0, 0), 4);
//! ```

pub mod engine;
pub mod slide;
pub mod types;

pub use engine::{spawn_tile, MoveOutcome, TileEngine, FOUR_TILE_PROBABILITY};
pub use slide::{is_terminal, is_victory, merge_line, slide, Slide};
pub use types::{
    Board, Direction, GameMode, ObstacleCell, ParseError, BOARD_SIZE, DEFAULT_VICTORY_TILE,
    INITIAL_TILES,
};
