//! Per-connection command handling.
//!
//! Each connection owns one [`CommandHandler`]. Frames are handled one at a
//! time in arrival order; the handler turns each into Board Engine calls and
//! session reads/writes, then queues exactly one reply for the connection.

use board_engine::{Direction, GameMode};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connection::ConnectionId;
use crate::error::CommandError;
use crate::leaderboard::LeaderboardType;
use crate::messaging::{ClientCommand, LeaderboardPayload, ServerMessage};
use crate::server::ServerContext;
use crate::session::{timestamp_now, GameSession, SessionEvent};

/// The reply to one command plus any follow-up work it triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: ServerMessage,
    /// Set when the command finished a game in this mode.
    pub finished: Option<GameMode>,
}

impl Reply {
    fn message(message: ServerMessage) -> Self {
        Self {
            message,
            finished: None,
        }
    }
}

/// Translates one connection's commands into game actions.
pub struct CommandHandler {
    ctx: Arc<ServerContext>,
    connection_id: ConnectionId,
    user_id: String,
}

impl CommandHandler {
    pub fn new(ctx: Arc<ServerContext>, connection_id: ConnectionId, user_id: String) -> Self {
        Self {
            ctx,
            connection_id,
            user_id,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Handles one inbound text frame and queues the reply.
    ///
    /// Malformed frames produce an `error` reply; the connection stays open.
    pub async fn handle_text(&self, text: &str) {
        let reply = match ClientCommand::parse(text) {
            Ok(command) => self.execute(command).await,
            Err(e) => {
                debug!(
                    "Rejected frame from user {} on connection {}: {:?}",
                    self.user_id, self.connection_id, e
                );
                Reply::message(ServerMessage::error(e))
            }
        };

        self.ctx
            .connections
            .send_to(self.connection_id, &reply.message)
            .await;

        if let Some(mode) = reply.finished {
            self.on_game_finished(mode).await;
        }
    }

    /// Runs a validated command and builds its reply.
    pub async fn execute(&self, command: ClientCommand) -> Reply {
        let result = match command {
            ClientCommand::Move(direction) => self.apply_move(direction).await,
            ClientCommand::NewGame(mode) => self.new_game(mode).await,
            ClientCommand::GetLeaderboard { kind, mode } => self.leaderboard(kind, mode).await,
        };
        result.unwrap_or_else(|e| Reply::message(ServerMessage::error(e)))
    }

    /// Sends the user's current session, if any, so a reconnecting client
    /// resumes where it left off.
    pub async fn push_current_state(&self) {
        match self.ctx.sessions.get_active(&self.user_id).await {
            Ok(Some(session)) => {
                debug!(
                    "Resuming session {} for user {} on connection {}",
                    session.id, self.user_id, self.connection_id
                );
                self.ctx
                    .connections
                    .send_to(self.connection_id, &ServerMessage::game_state(&session, None))
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not load session for user {}: {}", self.user_id, e),
        }
    }

    async fn apply_move(&self, direction: Direction) -> Result<Reply, CommandError> {
        let sessions = &self.ctx.sessions;
        let engine = &self.ctx.engine;
        let _guard = sessions.lock_user(&self.user_id).await;

        let mut session = sessions
            .get_active(&self.user_id)
            .await
            .map_err(|e| {
                warn!("Session lookup failed for user {}: {}", self.user_id, e);
                CommandError::StateUnavailable
            })?
            .ok_or(CommandError::NoActiveGame)?;

        if session.is_terminal() {
            return Err(CommandError::GameFinished);
        }

        let outcome = engine.apply_move(&session.board, direction, session.disabled_cell);
        if !outcome.moved {
            return Err(CommandError::NoTilesMoved);
        }

        session.board = outcome.board;
        session.score += u64::from(outcome.score_gained);
        session.victory = engine.is_victory(&session.board);
        session.game_over = engine.is_terminal(&session.board, session.disabled_cell);
        session.updated_at = timestamp_now();

        let event = SessionEvent::for_session(false, session.is_terminal());
        if let Err(e) = sessions.put(&session, event).await {
            warn!("Move for user {} applied but not stored: {}", self.user_id, e);
        }

        let message = if session.victory {
            Some(format!(
                "Congratulations! You merged two {} tiles and won!",
                engine.victory_tile() / 2
            ))
        } else if session.game_over {
            Some("Game Over! No more moves available.".to_string())
        } else {
            None
        };

        let finished = session.is_terminal().then_some(session.game_mode);
        if finished.is_some() {
            info!(
                "User {} finished game {} with score {} (victory: {})",
                self.user_id, session.id, session.score, session.victory
            );
        }

        Ok(Reply {
            message: ServerMessage::game_state(&session, message),
            finished,
        })
    }

    async fn new_game(&self, mode: GameMode) -> Result<Reply, CommandError> {
        let sessions = &self.ctx.sessions;
        let _guard = sessions.lock_user(&self.user_id).await;

        let (board, disabled_cell) = self.ctx.engine.new_board(mode);
        let session = GameSession::new(self.user_id.clone(), board, mode, disabled_cell);

        sessions
            .put(&session, SessionEvent::Created)
            .await
            .map_err(|_| CommandError::CreateFailed)?;

        info!("User {} started {} game {}", self.user_id, mode, session.id);

        let message = match mode {
            GameMode::Classic => "New game started!",
            GameMode::Challenge => "Challenge mode started! One cell is disabled.",
        };
        Ok(Reply::message(ServerMessage::game_state(
            &session,
            Some(message.to_string()),
        )))
    }

    async fn leaderboard(
        &self,
        kind: LeaderboardType,
        mode: GameMode,
    ) -> Result<Reply, CommandError> {
        let rankings = self.ctx.leaderboard.query(kind, mode).await.map_err(|e| {
            warn!("Leaderboard query {} {} failed: {}", mode, kind, e);
            CommandError::LeaderboardUnavailable
        })?;

        Ok(Reply::message(ServerMessage::Leaderboard(LeaderboardPayload {
            kind,
            game_mode: mode,
            rankings,
        })))
    }

    /// Invalidates cached rankings for `mode` and optionally pushes the new
    /// all-time ranking to everyone.
    async fn on_game_finished(&self, mode: GameMode) {
        self.ctx.leaderboard.invalidate(mode).await;

        if !self.ctx.config.broadcast_leaderboard_updates {
            return;
        }
        match self.ctx.leaderboard.query(LeaderboardType::All, mode).await {
            Ok(rankings) => {
                let update = ServerMessage::LeaderboardUpdate(LeaderboardPayload {
                    kind: LeaderboardType::All,
                    game_mode: mode,
                    rankings,
                });
                let delivered = self.ctx.connections.broadcast(&update).await;
                debug!("Leaderboard update for {} sent to {} connections", mode, delivered);
            }
            Err(e) => warn!("Could not refresh {} leaderboard for broadcast: {}", mode, e),
        }
    }
}
