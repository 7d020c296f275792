//! Error types for the game server.
//!
//! Errors are split by the layer that produces them. The `Display` text of
//! [`ProtocolError`] and [`CommandError`] is sent to clients verbatim inside
//! an `error` frame, so those messages are part of the wire protocol.

use thiserror::Error;

/// Errors that stop the server or a single connection.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding, accepting or transport-level failures.
    #[error("Network error: {0}")]
    Network(String),

    /// Failures in server orchestration.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Failures of the durable store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("lock poisoned")]
    LockPoisoned,

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither the cache nor the durable store accepted a session write.
    #[error("session {0} could not be written to any tier")]
    Unwritable(uuid::Uuid),
}

/// Failures of the volatile cache tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Token verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingToken,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Malformed inbound frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid message format")]
    InvalidFormat,

    #[error("Unknown message type")]
    UnknownType(String),

    #[error("Invalid move request format")]
    InvalidMoveFormat,

    #[error("Invalid direction")]
    InvalidDirection(String),

    #[error("Invalid leaderboard request format")]
    InvalidLeaderboardFormat,

    #[error("Invalid leaderboard type")]
    InvalidLeaderboardType(String),
}

/// Commands that were well-formed but could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("No active game found. Start a new game first.")]
    NoActiveGame,

    #[error("Game is already finished")]
    GameFinished,

    #[error("Invalid move - no tiles moved")]
    NoTilesMoved,

    #[error("Failed to get game state")]
    StateUnavailable,

    #[error("Failed to create new game")]
    CreateFailed,

    #[error("Failed to get leaderboard")]
    LeaderboardUnavailable,
}
