//! # Game Server
//!
//! WebSocket server for the single-player sliding-tile puzzle. Each
//! authenticated user drives one active game; the server resolves moves
//! with [`board_engine`], keeps the session in a two-tier store and serves
//! time-windowed rankings of finished games.
//!
//! ## Architecture Overview
//!
//! * **Connection Manager** ([`connection`]) - registry of live connections,
//!   each with a bounded outbound queue; supports best-effort broadcast
//! * **Command Handler** ([`messaging`]) - per-connection, sequential
//!   translation of `move` / `new_game` / `get_leaderboard` frames
//! * **Session Store** ([`session`]) - cache-first lookup of a user's
//!   current game, durable writes only on creation and completion
//! * **Leaderboard** ([`leaderboard`]) - cached ranking projection,
//!   invalidated whenever a game of that mode ends
//!
//! ### Message Flow
//!
//! 1. Client connects with `?token=...` (or a Bearer header)
//! 2. The token is verified and the user's active game, if any, is pushed
//! 3. Each inbound `{type, data}` frame is parsed into a [`ClientCommand`]
//! 4. The handler applies it and queues exactly one reply
//! 5. A finished game invalidates cached rankings for its mode
//!
//! ## Collaborators
//!
//! Storage, cache and identity verification are traits
//! ([`DurableStore`], [`VolatileCache`], [`IdentityVerifier`]) with
//! bundled implementations ([`SqliteStore`], [`MemoryCache`],
//! [`StaticTokenVerifier`]).
//!
//! ## Error Handling
//!
//! Protocol and command failures become `error` frames and never close the
//! connection. Storage failures are logged and degrade to the remaining
//! tier. Transport failures end only the affected connection.

pub use auth::{Identity, IdentityVerifier, StaticTokenVerifier};
pub use cache::{MemoryCache, VolatileCache};
pub use config::ServerConfig;
pub use error::{AuthError, CacheError, CommandError, ProtocolError, ServerError, StorageError};
pub use leaderboard::{Leaderboard, LeaderboardEntry, LeaderboardType};
pub use messaging::{ClientCommand, ServerMessage};
pub use server::{bind_listener, Collaborators, GameServer, ServerContext};
pub use session::{GameSession, SessionStore};
pub use storage::{DurableStore, SqliteStore, UserProfile};

pub mod auth;
pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod leaderboard;
pub mod messaging;
pub mod server;
pub mod session;
pub mod storage;
