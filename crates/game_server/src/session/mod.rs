//! Game sessions and the two-tier store that tracks each user's current one.

pub mod policy;
pub mod store;

pub use policy::{DurableWrite, SessionEvent, WritePolicy};
pub use store::SessionStore;

use board_engine::{Board, GameMode, ObstacleCell};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user's puzzle instance.
///
/// A session is active until either terminal flag is set; after that it is
/// never mutated again and becomes eligible for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: Uuid,
    pub user_id: String,
    pub board: Board,
    pub score: u64,
    pub game_over: bool,
    pub victory: bool,
    pub game_mode: GameMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_cell: Option<ObstacleCell>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GameSession {
    /// Starts a fresh session with a new random id and zero score.
    pub fn new(
        user_id: impl Into<String>,
        board: Board,
        game_mode: GameMode,
        disabled_cell: Option<ObstacleCell>,
    ) -> Self {
        let now = timestamp_now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            board,
            score: 0,
            game_over: false,
            victory: false,
            game_mode,
            disabled_cell,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.game_over || self.victory
    }
}

/// Current time at the millisecond precision the durable store keeps.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
