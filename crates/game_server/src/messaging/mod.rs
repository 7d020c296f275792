//! Wire protocol and command dispatch.

pub mod router;
pub mod types;

pub use router::{CommandHandler, Reply};
pub use types::{
    ClientCommand, Envelope, ErrorPayload, GameStatePayload, LeaderboardPayload, ServerMessage,
};
