//! SQLite backend for sessions and user profiles.

use async_trait::async_trait;
use board_engine::{Board, GameMode, ObstacleCell};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{DurableStore, RankingQuery, UserProfile};
use crate::error::StorageError;
use crate::leaderboard::LeaderboardEntry;
use crate::session::{timestamp_now, GameSession};

const SESSION_COLUMNS: &str = "id, user_id, board, score, game_over, victory, game_mode, \
                               disabled_cell, created_at, updated_at";

/// SQLite-backed [`DurableStore`].
///
/// `rusqlite::Connection` is not `Sync`, so every call goes through a mutex.
/// Timestamps are stored as milliseconds since the Unix epoch.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// A private database that disappears when the store is dropped.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                avatar TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS games (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                board TEXT NOT NULL,
                score INTEGER NOT NULL DEFAULT 0,
                game_over INTEGER NOT NULL DEFAULT 0,
                victory INTEGER NOT NULL DEFAULT 0,
                game_mode TEXT NOT NULL DEFAULT 'classic',
                disabled_cell TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_games_user_updated ON games(user_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_games_mode_created ON games(game_mode, created_at);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

/// Raw column values of a `games` row before validation.
struct SessionRow {
    id: String,
    user_id: String,
    board: String,
    score: i64,
    game_over: bool,
    victory: bool,
    game_mode: String,
    disabled_cell: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            board: row.get(2)?,
            score: row.get(3)?,
            game_over: row.get(4)?,
            victory: row.get(5)?,
            game_mode: row.get(6)?,
            disabled_cell: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl TryFrom<SessionRow> for GameSession {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StorageError::Corrupt(format!("game id {}: {e}", row.id)))?;
        let board: Board = serde_json::from_str(&row.board)?;
        let game_mode: GameMode = row
            .game_mode
            .parse()
            .map_err(|e| StorageError::Corrupt(format!("game {id}: {e}")))?;
        let disabled_cell: Option<ObstacleCell> = row
            .disabled_cell
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(GameSession {
            id,
            user_id: row.user_id,
            board,
            score: u64::try_from(row.score)
                .map_err(|_| StorageError::Corrupt(format!("game {id}: negative score")))?,
            game_over: row.game_over,
            victory: row.victory,
            game_mode,
            disabled_cell,
            created_at: from_millis(row.created_at)?,
            updated_at: from_millis(row.updated_at)?,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp out of range: {millis}")))
}

fn score_column(score: u64) -> Result<i64, StorageError> {
    i64::try_from(score).map_err(|_| StorageError::Corrupt(format!("score too large: {score}")))
}

fn disabled_cell_column(cell: Option<ObstacleCell>) -> Result<Option<String>, StorageError> {
    cell.as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(StorageError::from)
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn upsert_user(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let now = timestamp_now().timestamp_millis();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, name, avatar, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                avatar = excluded.avatar,
                updated_at = excluded.updated_at",
            params![profile.id, profile.name, profile.avatar, now],
        )?;
        Ok(())
    }

    async fn create_session(&self, session: &GameSession) -> Result<(), StorageError> {
        let board = serde_json::to_string(&session.board)?;
        let disabled_cell = disabled_cell_column(session.disabled_cell)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO games
             (id, user_id, board, score, game_over, victory, game_mode,
              disabled_cell, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session.id.to_string(),
                session.user_id,
                board,
                score_column(session.score)?,
                session.game_over,
                session.victory,
                session.game_mode.as_str(),
                disabled_cell,
                session.created_at.timestamp_millis(),
                session.updated_at.timestamp_millis(),
            ],
        )?;
        debug!("Inserted game {} for user {}", session.id, session.user_id);
        Ok(())
    }

    async fn update_session(&self, session: &GameSession) -> Result<bool, StorageError> {
        let board = serde_json::to_string(&session.board)?;
        let disabled_cell = disabled_cell_column(session.disabled_cell)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE games
             SET board = ?1, score = ?2, game_over = ?3, victory = ?4,
                 game_mode = ?5, disabled_cell = ?6, updated_at = ?7
             WHERE id = ?8 AND user_id = ?9",
            params![
                board,
                score_column(session.score)?,
                session.game_over,
                session.victory,
                session.game_mode.as_str(),
                disabled_cell,
                session.updated_at.timestamp_millis(),
                session.id.to_string(),
                session.user_id,
            ],
        )?;
        Ok(changed > 0)
    }

    async fn get_session(
        &self,
        id: Uuid,
        user_id: &str,
    ) -> Result<Option<GameSession>, StorageError> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM games WHERE id = ?1 AND user_id = ?2"),
                params![id.to_string(), user_id],
                SessionRow::from_row,
            )
            .optional()?
        };
        row.map(GameSession::try_from).transpose()
    }

    async fn get_active_session(
        &self,
        user_id: &str,
    ) -> Result<Option<GameSession>, StorageError> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM games
                     WHERE user_id = ?1 AND game_over = 0 AND victory = 0
                     ORDER BY updated_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![user_id],
                SessionRow::from_row,
            )
            .optional()?
        };
        row.map(GameSession::try_from).transpose()
    }

    async fn ranked_sessions(
        &self,
        query: &RankingQuery,
    ) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let since = query.since.map_or(i64::MIN, |t| t.timestamp_millis());
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);

        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare_cached(
                "SELECT g.user_id, COALESCE(u.name, g.user_id), COALESCE(u.avatar, ''),
                        g.score, g.id, g.game_mode, g.created_at
                 FROM (
                     SELECT id, user_id, score, game_mode, created_at,
                            ROW_NUMBER() OVER (
                                PARTITION BY user_id
                                ORDER BY score DESC, created_at ASC, rowid ASC
                            ) AS pick
                     FROM games
                     WHERE game_mode = ?1
                       AND (game_over = 1 OR victory = 1)
                       AND created_at >= ?2
                 ) g
                 LEFT JOIN users u ON u.id = g.user_id
                 WHERE g.pick = 1
                 ORDER BY g.score DESC, g.created_at ASC
                 LIMIT ?3",
            )?;
            let mapped = stmt.query_map(
                params![query.mode.as_str(), since, limit],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        rows.into_iter()
            .enumerate()
            .map(|(i, (user_id, user_name, user_avatar, score, id, created_at))| {
                let game_id = Uuid::parse_str(&id)
                    .map_err(|e| StorageError::Corrupt(format!("game id {id}: {e}")))?;
                Ok(LeaderboardEntry {
                    user_id,
                    user_name,
                    user_avatar,
                    score: u64::try_from(score).unwrap_or(0),
                    rank: i as u32 + 1,
                    game_id,
                    game_mode: query.mode,
                    created_at: from_millis(created_at)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn finished(user: &str, score: u64, mode: GameMode) -> GameSession {
        let mut session = GameSession::new(user, Board::new(), mode, None);
        session.score = score;
        session.game_over = true;
        session
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut session = GameSession::new(
            "alice",
            Board::from_rows([[2, 0, 0, 0], [0; 4], [0; 4], [0, 0, 0, 4]]),
            GameMode::Challenge,
            ObstacleCell::new(1, 2),
        );
        store.create_session(&session).await.unwrap();

        let loaded = store.get_session(session.id, "alice").await.unwrap();
        assert_eq!(loaded.as_ref(), Some(&session));

        // Owner mismatch hides the row
        assert!(store.get_session(session.id, "bob").await.unwrap().is_none());

        session.score = 12;
        session.game_over = true;
        assert!(store.update_session(&session).await.unwrap());
        let loaded = store.get_session(session.id, "alice").await.unwrap().unwrap();
        assert_eq!(loaded.score, 12);
        assert!(loaded.game_over);
    }

    #[tokio::test]
    async fn test_update_missing_row_reports_false() {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = finished("alice", 10, GameMode::Classic);
        assert!(!store.update_session(&session).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_session_is_latest_non_terminal() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.get_active_session("alice").await.unwrap().is_none());

        let first = GameSession::new("alice", Board::new(), GameMode::Classic, None);
        let second = GameSession::new("alice", Board::new(), GameMode::Classic, None);
        let done = finished("alice", 100, GameMode::Classic);
        store.create_session(&first).await.unwrap();
        store.create_session(&second).await.unwrap();
        store.create_session(&done).await.unwrap();

        let active = store.get_active_session("alice").await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
    }

    #[tokio::test]
    async fn test_ranking_keeps_best_session_per_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_user(&UserProfile {
                id: "alice".into(),
                name: "Alice".into(),
                avatar: "a.png".into(),
            })
            .await
            .unwrap();

        for session in [
            finished("alice", 300, GameMode::Classic),
            finished("alice", 500, GameMode::Classic),
            finished("bob", 400, GameMode::Classic),
            finished("carol", 900, GameMode::Challenge),
        ] {
            store.create_session(&session).await.unwrap();
        }
        // Active sessions never rank
        let mut active = GameSession::new("dave", Board::new(), GameMode::Classic, None);
        active.score = 10_000;
        store.create_session(&active).await.unwrap();

        let ranked = store
            .ranked_sessions(&RankingQuery {
                mode: GameMode::Classic,
                since: None,
                limit: 100,
            })
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].user_id, "alice");
        assert_eq!(ranked[0].user_name, "Alice");
        assert_eq!(ranked[0].user_avatar, "a.png");
        assert_eq!(ranked[0].score, 500);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].user_id, "bob");
        assert_eq!(ranked[1].user_name, "bob");
        assert_eq!(ranked[1].rank, 2);
    }

    #[tokio::test]
    async fn test_ranking_window_and_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut old = finished("old", 1000, GameMode::Classic);
        old.created_at = old.created_at - Duration::days(40);
        store.create_session(&old).await.unwrap();
        for (user, score) in [("a", 10), ("b", 20), ("c", 30)] {
            store
                .create_session(&finished(user, score, GameMode::Classic))
                .await
                .unwrap();
        }

        let recent = store
            .ranked_sessions(&RankingQuery {
                mode: GameMode::Classic,
                since: Some(Utc::now() - Duration::days(1)),
                limit: 2,
            })
            .await
            .unwrap();
        let users: Vec<_> = recent.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(users, ["c", "b"]);

        let all = store
            .ranked_sessions(&RankingQuery {
                mode: GameMode::Classic,
                since: None,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(all[0].user_id, "old");
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("game.db");
        let session = finished("alice", 64, GameMode::Classic);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_session(&session).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store.get_session(session.id, "alice").await.unwrap();
        assert_eq!(loaded, Some(session));
    }

    #[test]
    fn test_unusable_parent_directory_is_an_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = SqliteStore::open(blocker.join("game.db"));
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
