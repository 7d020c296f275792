//! Time-windowed rankings of finished sessions.
//!
//! Rankings are computed by the durable store and cached per mode and
//! window. A finished game invalidates every window of its mode.

use board_engine::GameMode;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{self, VolatileCache};
use crate::error::{ProtocolError, StorageError};
use crate::storage::{DurableStore, RankingQuery};

/// One row of a ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub user_name: String,
    pub user_avatar: String,
    pub score: u64,
    pub rank: u32,
    pub game_id: Uuid,
    pub game_mode: GameMode,
    pub created_at: DateTime<Utc>,
}

/// Ranking window. All windows are computed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardType {
    Daily,
    Weekly,
    Monthly,
    All,
}

impl LeaderboardType {
    pub const ALL: [LeaderboardType; 4] = [
        LeaderboardType::Daily,
        LeaderboardType::Weekly,
        LeaderboardType::Monthly,
        LeaderboardType::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardType::Daily => "daily",
            LeaderboardType::Weekly => "weekly",
            LeaderboardType::Monthly => "monthly",
            LeaderboardType::All => "all",
        }
    }

    /// Start of the window containing `now`: midnight today, Monday of this
    /// week or the first of this month. `All` has no lower bound.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let start = match self {
            LeaderboardType::Daily => today,
            LeaderboardType::Weekly => {
                today - ChronoDuration::days(i64::from(today.weekday().num_days_from_monday()))
            }
            LeaderboardType::Monthly => today.with_day(1).unwrap_or(today),
            LeaderboardType::All => return None,
        };
        Some(start.and_time(NaiveTime::MIN).and_utc())
    }
}

impl fmt::Display for LeaderboardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(LeaderboardType::Daily),
            "weekly" => Ok(LeaderboardType::Weekly),
            "monthly" => Ok(LeaderboardType::Monthly),
            "all" => Ok(LeaderboardType::All),
            other => Err(ProtocolError::InvalidLeaderboardType(other.to_string())),
        }
    }
}

pub fn cache_key(mode: GameMode, kind: LeaderboardType) -> String {
    format!("leaderboard:{mode}:{kind}")
}

/// Cache-first ranking projection over the durable store.
pub struct Leaderboard {
    store: Arc<dyn DurableStore>,
    cache: Option<Arc<dyn VolatileCache>>,
    max_entries: usize,
    cache_ttl: Duration,
}

impl Leaderboard {
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: Option<Arc<dyn VolatileCache>>,
        max_entries: usize,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            max_entries,
            cache_ttl,
        }
    }

    /// Returns the current ranking for `kind` and `mode`.
    ///
    /// Cache failures fall through to the store; only a store failure is
    /// returned to the caller.
    pub async fn query(
        &self,
        kind: LeaderboardType,
        mode: GameMode,
    ) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let key = cache_key(mode, kind);

        if let Some(cache) = &self.cache {
            match cache::get_json::<Vec<LeaderboardEntry>>(cache.as_ref(), &key).await {
                Ok(Some(entries)) => {
                    debug!("Leaderboard cache hit for {}", key);
                    return Ok(entries);
                }
                Ok(None) => {}
                Err(e) => warn!("Leaderboard cache read failed for {}: {}", key, e),
            }
        }

        let entries = self
            .store
            .ranked_sessions(&RankingQuery {
                mode,
                since: kind.since(Utc::now()),
                limit: self.max_entries,
            })
            .await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache::set_json(cache.as_ref(), &key, &entries, self.cache_ttl).await {
                warn!("Failed to cache leaderboard {}: {}", key, e);
            }
        }

        Ok(entries)
    }

    /// Drops every cached window for `mode`.
    pub async fn invalidate(&self, mode: GameMode) {
        let Some(cache) = &self.cache else {
            return;
        };
        for kind in LeaderboardType::ALL {
            let key = cache_key(mode, kind);
            if let Err(e) = cache.delete(&key).await {
                warn!("Failed to invalidate leaderboard {}: {}", key, e);
            }
        }
        debug!("Invalidated {} leaderboards", mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::session::GameSession;
    use crate::storage::SqliteStore;
    use board_engine::Board;
    use chrono::TimeZone;

    #[test]
    fn test_window_starts() {
        // Thursday 2024-03-14 15:30 UTC
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 15, 30, 0).unwrap();

        assert_eq!(
            LeaderboardType::Daily.since(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(
            LeaderboardType::Weekly.since(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap())
        );
        assert_eq!(
            LeaderboardType::Monthly.since(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(LeaderboardType::All.since(now), None);
    }

    #[test]
    fn test_week_starting_on_monday() {
        let monday = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 1).unwrap();
        assert_eq!(
            LeaderboardType::Weekly.since(monday),
            Some(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_and_keys() {
        assert_eq!("weekly".parse::<LeaderboardType>(), Ok(LeaderboardType::Weekly));
        assert!("yearly".parse::<LeaderboardType>().is_err());
        assert_eq!(
            cache_key(GameMode::Challenge, LeaderboardType::Daily),
            "leaderboard:challenge:daily"
        );
    }

    #[tokio::test]
    async fn test_query_is_cached_until_invalidated() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let cache = Arc::new(MemoryCache::new());
        let board = Leaderboard::new(
            store.clone(),
            Some(cache.clone()),
            100,
            Duration::from_secs(300),
        );

        let mut first = GameSession::new("alice", Board::new(), GameMode::Classic, None);
        first.score = 128;
        first.game_over = true;
        store.create_session(&first).await.unwrap();

        let ranked = board.query(LeaderboardType::All, GameMode::Classic).await.unwrap();
        assert_eq!(ranked.len(), 1);

        let mut second = GameSession::new("bob", Board::new(), GameMode::Classic, None);
        second.score = 256;
        second.victory = true;
        store.create_session(&second).await.unwrap();

        // Served from cache
        let cached = board.query(LeaderboardType::All, GameMode::Classic).await.unwrap();
        assert_eq!(cached, ranked);

        board.invalidate(GameMode::Classic).await;
        let fresh = board.query(LeaderboardType::All, GameMode::Classic).await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].user_id, "bob");
        assert_eq!(fresh[0].rank, 1);
    }
}
