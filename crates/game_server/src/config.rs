//! Server configuration types and defaults.
//!
//! This module contains the runtime configuration of the game server. The
//! binary builds it from its TOML file and command-line overrides; tests
//! construct it directly.

use board_engine::DEFAULT_VICTORY_TILE;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the game server.
///
/// Contains network settings, per-connection keepalive timing, game rules
/// and leaderboard behaviour.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,

    /// Capacity of each connection's outbound message queue
    ///
    /// A connection whose queue is full is considered dead and dropped.
    pub outbound_queue_capacity: usize,

    /// How often the writer pings an idle client
    pub ping_interval: Duration,

    /// How long the reader waits for any frame (including a pong)
    pub pong_wait: Duration,

    /// Deadline for a single outbound write
    pub write_wait: Duration,

    /// Tile value that wins a game
    pub victory_tile: u32,

    /// Expiry of a user's cached session, refreshed on every write
    pub session_ttl: Duration,

    /// Maximum rows returned by a ranking query
    pub leaderboard_max_entries: usize,

    /// Expiry of cached rankings
    pub leaderboard_cache_ttl: Duration,

    /// Push a refreshed ranking to every connection when a game ends
    pub broadcast_leaderboard_updates: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_connections: 1000,
            outbound_queue_capacity: 256,
            ping_interval: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
            victory_tile: DEFAULT_VICTORY_TILE,
            session_ttl: Duration::from_secs(3600),
            leaderboard_max_entries: 100,
            leaderboard_cache_ttl: Duration::from_secs(300),
            broadcast_leaderboard_updates: false,
        }
    }
}
