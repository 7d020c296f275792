//! Message type definitions for client-server communication.
//!
//! Every frame is a JSON object `{"type": ..., "data": {...}}`. Inbound
//! frames are validated once into [`ClientCommand`]; outbound frames are
//! built from [`ServerMessage`].

use board_engine::{Board, Direction, GameMode, ObstacleCell};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::leaderboard::{LeaderboardEntry, LeaderboardType};
use crate::session::GameSession;

/// The raw envelope of an inbound frame.
///
/// # Example
///
/// ```json
/// { "type": "move", "data": { "direction": "left" } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MoveRequest {
    #[serde(default)]
    direction: String,
}

#[derive(Debug, Deserialize)]
struct NewGameRequest {
    #[serde(default)]
    game_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardRequest {
    #[serde(rename = "type", default)]
    kind: String,

    #[serde(default)]
    game_mode: Option<String>,
}

/// A validated client command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Move(Direction),
    NewGame(GameMode),
    GetLeaderboard {
        kind: LeaderboardType,
        mode: GameMode,
    },
}

impl ClientCommand {
    /// Parses and validates one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|_| ProtocolError::InvalidFormat)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let data = match envelope.data {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };

        match envelope.kind.as_str() {
            "move" => {
                let request: MoveRequest = serde_json::from_value(data)
                    .map_err(|_| ProtocolError::InvalidMoveFormat)?;
                let direction = request
                    .direction
                    .parse()
                    .map_err(|_| ProtocolError::InvalidDirection(request.direction))?;
                Ok(ClientCommand::Move(direction))
            }
            "new_game" => {
                let mode = serde_json::from_value::<NewGameRequest>(data)
                    .ok()
                    .and_then(|request| request.game_mode)
                    .map(|mode| parse_mode_or_classic(&mode))
                    .unwrap_or_default();
                Ok(ClientCommand::NewGame(mode))
            }
            "get_leaderboard" => {
                let request: LeaderboardRequest = serde_json::from_value(data)
                    .map_err(|_| ProtocolError::InvalidLeaderboardFormat)?;
                let kind = request.kind.parse()?;
                let mode = request
                    .game_mode
                    .as_deref()
                    .map(parse_mode_or_classic)
                    .unwrap_or_default();
                Ok(ClientCommand::GetLeaderboard { kind, mode })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

fn parse_mode_or_classic(mode: &str) -> GameMode {
    mode.parse().unwrap_or_default()
}

/// Body of a `game_state` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatePayload {
    pub board: Board,
    pub score: u64,
    pub game_over: bool,
    pub victory: bool,
    pub game_mode: GameMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_cell: Option<ObstacleCell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `leaderboard` and `leaderboard_update` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardPayload {
    #[serde(rename = "type")]
    pub kind: LeaderboardType,
    pub game_mode: GameMode,
    pub rankings: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// A frame sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    GameState(GameStatePayload),
    Leaderboard(LeaderboardPayload),
    LeaderboardUpdate(LeaderboardPayload),
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Full snapshot of `session`, enough for a client to resynchronize.
    pub fn game_state(session: &GameSession, message: Option<String>) -> Self {
        ServerMessage::GameState(GameStatePayload {
            board: session.board,
            score: session.score,
            game_over: session.game_over,
            victory: session.victory,
            game_mode: session.game_mode,
            disabled_cell: session.disabled_cell,
            message,
        })
    }

    pub fn error(message: impl ToString) -> Self {
        ServerMessage::Error(ErrorPayload {
            message: message.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
