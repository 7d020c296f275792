//! Durable storage for users and game sessions.
//!
//! The [`DurableStore`] trait is the seam between the server and whatever
//! database backs it; [`SqliteStore`] is the bundled implementation.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use board_engine::GameMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::leaderboard::LeaderboardEntry;
use crate::session::GameSession;

/// Display data for a verified user, joined into ranking rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

/// Parameters of a ranking query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingQuery {
    pub mode: GameMode,
    /// Only sessions created at or after this instant; `None` for all time.
    pub since: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Persistent store for sessions and user profiles.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<(), StorageError>;

    async fn create_session(&self, session: &GameSession) -> Result<(), StorageError>;

    /// Overwrites an existing session row. Returns `false` when no row
    /// matched the session id and owner.
    async fn update_session(&self, session: &GameSession) -> Result<bool, StorageError>;

    async fn get_session(
        &self,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<GameSession>, StorageError>;

    /// The most recently updated non-terminal session owned by `user_id`.
    async fn get_active_session(&self, user_id: &str)
        -> Result<Option<GameSession>, StorageError>;

    /// Each user's best terminal session matching `query`, best first,
    /// ranked from 1.
    async fn ranked_sessions(
        &self,
        query: &RankingQuery,
    ) -> Result<Vec<LeaderboardEntry>, StorageError>;
}
