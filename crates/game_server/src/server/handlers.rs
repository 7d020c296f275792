//! Per-connection lifecycle: handshake, authentication, and the read and
//! write halves of the WebSocket.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, info, warn};

use super::ServerContext;
use crate::auth::extract_token;
use crate::error::{AuthError, ServerError};
use crate::messaging::{CommandHandler, ServerMessage};
use crate::storage::UserProfile;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Runs one client connection from handshake to teardown.
///
/// # Flow
///
/// 1. Upgrade to WebSocket; a request without a token gets HTTP 401
/// 2. Verify the token; an invalid one gets an `error` frame and a close
/// 3. Upsert the user profile, register with the hub, push any active session
/// 4. Run the reader and the writer until either finishes
/// 5. Unregister
///
/// Steps 1 and 2 must each finish within `pong_wait`. Registration is
/// refused once the server has shut down.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
) -> Result<(), ServerError> {
    let handshake_wait = ctx.config.pong_wait;
    let write_wait = ctx.config.write_wait;

    let mut token = None;
    let handshake = accept_hdr_async(stream, |request: &Request, response: Response| {
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        match extract_token(request.uri().query(), authorization) {
            Some(found) => {
                token = Some(found);
                Ok(response)
            }
            None => {
                let mut rejection = ErrorResponse::new(Some("missing authentication token".into()));
                *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                Err(rejection)
            }
        }
    });
    let ws_stream = timeout(handshake_wait, handshake)
        .await
        .map_err(|_| ServerError::Network(format!("handshake from {addr} timed out")))??;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let token = token.unwrap_or_default();
    let verified = timeout(handshake_wait, ctx.verifier.verify(&token))
        .await
        .unwrap_or_else(|_| Err(AuthError::Unavailable("verification timed out".into())));
    let identity = match verified {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejected connection from {}: {}", addr, e);
            close_with(&mut ws_sender, Some(ServerMessage::error(&e)), write_wait, addr).await;
            return Err(e.into());
        }
    };

    let user_id = identity.user_id.clone();
    if let Err(e) = ctx
        .sessions
        .durable()
        .upsert_user(&UserProfile::from(&identity))
        .await
    {
        warn!("Failed to store profile for user {}: {}", user_id, e);
    }

    let Some((connection_id, outbound)) = ctx.connections.register(user_id.clone(), addr).await
    else {
        info!("Server is shutting down, closing connection from {}", addr);
        close_with(&mut ws_sender, None, write_wait, addr).await;
        return Ok(());
    };
    info!("👋 User {} connected from {} as connection {}", user_id, addr, connection_id);

    let handler = CommandHandler::new(ctx.clone(), connection_id, user_id.clone());
    handler.push_current_state().await;

    let writer = write_loop(ws_sender, outbound, ctx.config.ping_interval, write_wait);

    let pong_wait = ctx.config.pong_wait;
    let reader = async {
        loop {
            let message = match timeout(pong_wait, ws_receiver.next()).await {
                Err(_) => {
                    info!("Connection {} idle for {:?}, closing", connection_id, pong_wait);
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    debug!("Read error on connection {}: {}", connection_id, e);
                    break;
                }
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Text(text) => handler.handle_text(text.as_str()).await,
                Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                    Ok(text) => handler.handle_text(text).await,
                    Err(_) => handler.handle_text("").await,
                },
                Message::Close(frame) => {
                    debug!("Connection {} closed by client: {:?}", connection_id, frame);
                    break;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    };

    tokio::select! {
        result = writer => {
            if let Err(e) = result {
                debug!("Writer for connection {} stopped: {}", connection_id, e);
            }
        }
        _ = reader => {}
    }

    ctx.connections.unregister(connection_id).await;
    ctx.sessions.release_user_lock(&user_id);
    info!("👋 User {} disconnected (connection {})", user_id, connection_id);
    Ok(())
}

/// Drains the outbound queue into the socket and pings on `ping_interval`.
///
/// Ends with a Close frame once the registry drops the queue's sender.
async fn write_loop(
    mut sink: WsSink,
    mut outbound: mpsc::Receiver<String>,
    ping_interval: Duration,
    write_wait: Duration,
) -> Result<(), ServerError> {
    let mut ping = interval(ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => write_frame(&mut sink, Message::text(text), write_wait).await?,
                None => {
                    write_frame(&mut sink, Message::Close(None), write_wait).await?;
                    return Ok(());
                }
            },
            _ = ping.tick() => {
                write_frame(&mut sink, Message::Ping(Default::default()), write_wait).await?;
            }
        }
    }
}

/// Sends an optional last frame followed by Close; failures are only logged.
async fn close_with(
    sink: &mut WsSink,
    last: Option<ServerMessage>,
    wait: Duration,
    addr: SocketAddr,
) {
    if let Some(text) = last.and_then(|message| message.to_json().ok()) {
        if let Err(e) = write_frame(sink, Message::text(text), wait).await {
            debug!("Could not deliver final frame to {}: {}", addr, e);
        }
    }
    if let Err(e) = write_frame(sink, Message::Close(None), wait).await {
        debug!("Could not close connection from {}: {}", addr, e);
    }
}

async fn write_frame(
    sink: &mut WsSink,
    message: Message,
    wait: Duration,
) -> Result<(), ServerError> {
    timeout(wait, sink.send(message))
        .await
        .map_err(|_| ServerError::Network(format!("write timed out after {wait:?}")))??;
    Ok(())
}
