//! Pure move resolution: compaction, merging and terminal detection.
//!
//! Nothing here touches randomness, so every function is deterministic
//! for a given board, direction and obstacle.

use crate::types::{Board, Direction, ObstacleCell, BOARD_SIZE};

type Line = [(usize, usize); BOARD_SIZE];

/// Result of sliding a board in one direction, before any spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slide {
    pub board: Board,
    pub score_gained: u32,
    pub moved: bool,
}

/// Coordinates of every line for `direction`, each ordered from the edge
/// tiles travel towards.
fn lines(direction: Direction) -> [Line; BOARD_SIZE] {
    let mut out = [[(0, 0); BOARD_SIZE]; BOARD_SIZE];
    for (i, line) in out.iter_mut().enumerate() {
        for (j, cell) in line.iter_mut().enumerate() {
            *cell = match direction {
                Direction::Left => (i, j),
                Direction::Right => (i, BOARD_SIZE - 1 - j),
                Direction::Up => (j, i),
                Direction::Down => (BOARD_SIZE - 1 - j, i),
            };
        }
    }
    out
}

/// Compacts `tiles` towards index 0 and merges equal neighbours.
///
/// Each tile merges at most once per move and pairs form from the leading
/// edge, so `[2, 2, 2]` becomes `[4, 2]`. Returns the compacted values
/// (unpadded) and the sum of the merged tiles.
pub fn merge_line(tiles: &[u32]) -> (Vec<u32>, u32) {
    let mut merged = Vec::with_capacity(tiles.len());
    let mut score = 0;
    let mut pending: Option<u32> = None;

    for &tile in tiles.iter().filter(|&&tile| tile != 0) {
        match pending.take() {
            Some(prev) if prev == tile => {
                let value = prev * 2;
                score += value;
                merged.push(value);
            }
            Some(prev) => {
                merged.push(prev);
                pending = Some(tile);
            }
            None => pending = Some(tile),
        }
    }
    merged.extend(pending);

    (merged, score)
}

/// Slides every tile as far as possible in `direction`.
///
/// The obstacle, if present, acts as a wall: cells on either side of it form
/// separate segments that never exchange tiles.
pub fn slide(board: &Board, direction: Direction, obstacle: Option<ObstacleCell>) -> Slide {
    let mut next = *board;
    let mut score_gained = 0;

    for line in lines(direction) {
        let segments = line
            .split(|&(row, col)| obstacle.is_some_and(|cell| cell.is_at(row, col)));
        for segment in segments {
            let tiles: Vec<u32> = segment.iter().map(|&(r, c)| board.get(r, c)).collect();
            let (merged, score) = merge_line(&tiles);
            score_gained += score;
            for (i, &(row, col)) in segment.iter().enumerate() {
                next.set(row, col, merged.get(i).copied().unwrap_or(0));
            }
        }
    }

    Slide {
        moved: next != *board,
        board: next,
        score_gained,
    }
}

/// True when the board is full and no direction changes it.
pub fn is_terminal(board: &Board, obstacle: Option<ObstacleCell>) -> bool {
    board.is_full(obstacle)
        && Direction::ALL
            .iter()
            .all(|&direction| !slide(board, direction, obstacle).moved)
}

/// True when any cell holds exactly `victory_tile`.
pub fn is_victory(board: &Board, victory_tile: u32) -> bool {
    board.contains(victory_tile)
}
