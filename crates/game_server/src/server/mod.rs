//! Server orchestration: shared state, accept loop and per-connection tasks.

mod core;
mod handlers;

pub use self::core::{bind_listener, GameServer};
pub use handlers::handle_connection;

use board_engine::TileEngine;
use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::cache::VolatileCache;
use crate::config::ServerConfig;
use crate::connection::ConnectionManager;
use crate::leaderboard::Leaderboard;
use crate::session::SessionStore;
use crate::storage::DurableStore;

/// External capabilities the server is wired with.
pub struct Collaborators {
    pub store: Arc<dyn DurableStore>,
    /// `None` runs every session write against the durable store.
    pub cache: Option<Arc<dyn VolatileCache>>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub engine: TileEngine,
}

/// State shared by every connection task.
pub struct ServerContext {
    pub config: ServerConfig,
    pub engine: TileEngine,
    pub sessions: SessionStore,
    pub leaderboard: Leaderboard,
    pub connections: ConnectionManager,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl ServerContext {
    pub fn new(config: ServerConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            cache,
            verifier,
            engine,
        } = collaborators;

        Self {
            engine: engine.with_victory_tile(config.victory_tile),
            sessions: SessionStore::new(store.clone(), cache.clone(), config.session_ttl),
            leaderboard: Leaderboard::new(
                store,
                cache,
                config.leaderboard_max_entries,
                config.leaderboard_cache_ttl,
            ),
            connections: ConnectionManager::new(config.outbound_queue_capacity),
            verifier,
            config,
        }
    }
}
