//! Cache-first session lookup with durable fallback.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use super::policy::{DurableWrite, SessionEvent, WritePolicy};
use super::GameSession;
use crate::cache::{self, VolatileCache};
use crate::error::StorageError;
use crate::storage::DurableStore;

/// Single point of truth for "what is this user's current session".
///
/// Hides the two storage tiers behind one API. The cache holds in-progress
/// state; the durable store is written according to [`WritePolicy`], and
/// takes over completely when the cache is missing or failing.
pub struct SessionStore {
    store: Arc<dyn DurableStore>,
    cache: Option<Arc<dyn VolatileCache>>,
    ttl: Duration,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: Option<Arc<dyn VolatileCache>>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            ttl,
            user_locks: DashMap::new(),
        }
    }

    pub fn durable(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Serializes read-modify-write cycles for one user.
    ///
    /// Hold the guard from [`get_active`](Self::get_active) until the
    /// matching [`put`](Self::put) so two connections of the same user
    /// cannot interleave.
    pub async fn lock_user(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Drops the user's lock entry if nobody holds or awaits it.
    pub fn release_user_lock(&self, user_id: &str) {
        self.user_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Returns the user's current session, or `None` when there is none.
    ///
    /// The cached value is returned as-is, including a session that just
    /// became terminal. On a cache miss the most recently updated active
    /// session in the durable store is used and written back to the cache.
    pub async fn get_active(&self, user_id: &str) -> Result<Option<GameSession>, StorageError> {
        let key = cache::session_key(user_id);

        if let Some(cache) = &self.cache {
            match cache::get_json::<GameSession>(cache.as_ref(), &key).await {
                Ok(Some(session)) => return Ok(Some(session)),
                Ok(None) => {}
                Err(e) => warn!("Session cache read failed for user {}: {}", user_id, e),
            }
        }

        let session = self.store.get_active_session(user_id).await?;

        if let (Some(cache), Some(session)) = (&self.cache, &session) {
            debug!("Restoring session {} for user {} into cache", session.id, user_id);
            if let Err(e) = cache::set_json(cache.as_ref(), &key, session, self.ttl).await {
                warn!("Failed to cache session for user {}: {}", user_id, e);
            }
        }

        Ok(session)
    }

    /// Writes `session` to the tiers selected by `event`.
    ///
    /// Fails only when no tier ended up holding the session. A durable
    /// failure after a successful cache write is logged and retried by the
    /// next durable write of the same session.
    pub async fn put(
        &self,
        session: &GameSession,
        event: SessionEvent,
    ) -> Result<(), StorageError> {
        let mut policy = WritePolicy::for_event(event);

        let cached = match (&self.cache, policy.cache) {
            (Some(cache), true) => {
                let key = cache::session_key(&session.user_id);
                match cache::set_json(cache.as_ref(), &key, session, self.ttl).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            "Session cache write failed for user {}, using durable store: {}",
                            session.user_id, e
                        );
                        false
                    }
                }
            }
            _ => false,
        };
        if !cached {
            policy = policy.without_cache();
        }

        let written = match policy.durable {
            DurableWrite::None => Ok(()),
            DurableWrite::Insert => self.store.create_session(session).await,
            DurableWrite::Upsert => self.upsert(session).await,
        };

        match written {
            Ok(()) => Ok(()),
            Err(e) if cached => {
                warn!(
                    "Durable write of session {} ({:?}) failed, kept in cache: {}",
                    session.id, event, e
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Session {} for user {} was not stored: {}",
                    session.id, session.user_id, e
                );
                Err(StorageError::Unwritable(session.id))
            }
        }
    }

    async fn upsert(&self, session: &GameSession) -> Result<(), StorageError> {
        if self.store.update_session(session).await? {
            return Ok(());
        }
        debug!("Session {} not in durable store yet, inserting", session.id);
        self.store.create_session(session).await
    }
}
