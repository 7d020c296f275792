//! End-to-end tests over real WebSocket connections.
//!
//! Each test binds a server on an ephemeral port and drives it with the
//! tungstenite client, exactly as a browser would.

use board_engine::{Direction, TileEngine};
use futures::{SinkExt, StreamExt};
use game_server::messaging::GameStatePayload;
use game_server::{
    bind_listener, Collaborators, GameServer, Identity, MemoryCache, ServerConfig, ServerMessage,
    SqliteStore, StaticTokenVerifier,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{client_async, connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    server: Arc<GameServer>,
    addr: SocketAddr,
    task: JoinHandle<Result<(), game_server::ServerError>>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(ServerConfig::default()).await
    }

    async fn start_with(config: ServerConfig) -> Self {
        let verifier = StaticTokenVerifier::new()
            .with_token(
                "tok-alice",
                Identity {
                    user_id: "alice".into(),
                    name: "Alice".into(),
                    avatar: "https://example.invalid/alice.png".into(),
                },
            )
            .with_token(
                "tok-bob",
                Identity {
                    user_id: "bob".into(),
                    name: "Bob".into(),
                    avatar: String::new(),
                },
            );

        let server = Arc::new(GameServer::new(
            config,
            Collaborators {
                store: Arc::new(SqliteStore::open_in_memory().unwrap()),
                cache: Some(Arc::new(MemoryCache::new())),
                verifier: Arc::new(verifier),
                engine: TileEngine::from_seed(7),
            },
        ));

        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.serve(listener).await }
        });

        Self { server, addr, task }
    }

    async fn connect(&self, token: &str) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws?token={}", self.addr, token))
            .await
            .expect("handshake failed");
        client
    }
}

async fn send(client: &mut Client, frame: serde_json::Value) {
    client
        .send(Message::text(frame.to_string()))
        .await
        .expect("send failed");
}

/// Next protocol frame, skipping keepalive traffic. `None` on close.
async fn next_message<S>(client: &mut WebSocketStream<S>) -> Option<ServerMessage>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(other) => panic!("unexpected frame: {other:?}"),
        }
    }
}

fn state(message: Option<ServerMessage>) -> GameStatePayload {
    match message {
        Some(ServerMessage::GameState(state)) => state,
        other => panic!("expected game_state, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_token_is_refused_with_401() {
    let server = TestServer::start().await;

    let result = connect_async(format!("ws://{}/ws", server.addr)).await;
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 401),
        other => panic!("expected HTTP 401, got {:?}", other.map(|(_, r)| r.status())),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_token_gets_error_then_close() {
    let server = TestServer::start().await;
    let mut client = server.connect("nope").await;

    match next_message(&mut client).await {
        Some(ServerMessage::Error(payload)) => {
            assert_eq!(payload.message, "Invalid authentication token")
        }
        other => panic!("expected error frame, got {other:?}"),
    }
    assert!(next_message(&mut client).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_resumes_after_reconnect() {
    let server = TestServer::start().await;
    let mut client = server.connect("tok-alice").await;

    send(
        &mut client,
        serde_json::json!({"type": "new_game", "data": {"game_mode": "classic"}}),
    )
    .await;
    let mut last = state(next_message(&mut client).await);
    assert_eq!(last.message.as_deref(), Some("New game started!"));

    let mut moves = 0;
    for direction in Direction::ALL.iter().cycle().take(12) {
        send(
            &mut client,
            serde_json::json!({"type": "move", "data": {"direction": direction}}),
        )
        .await;
        match next_message(&mut client).await {
            Some(ServerMessage::GameState(next)) => {
                last = next;
                moves += 1;
            }
            Some(ServerMessage::Error(payload)) => {
                assert_eq!(payload.message, "Invalid move - no tiles moved")
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
    assert!(moves > 0);

    client.close(None).await.unwrap();
    drop(client);

    let mut again = server.connect("tok-alice").await;
    let resumed = state(next_message(&mut again).await);
    assert_eq!(resumed.board, last.board);
    assert_eq!(resumed.score, last.score);
    assert_eq!(resumed.game_over, last.game_over);
    assert_eq!(resumed.victory, last.victory);
    assert_eq!(resumed.game_mode, last.game_mode);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bearer_header_and_leaderboard() {
    let server = TestServer::start().await;

    let mut request = format!("ws://{}/ws", server.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert(AUTHORIZATION, "Bearer tok-bob".parse().unwrap());
    let (mut client, _) = connect_async(request).await.unwrap();

    send(
        &mut client,
        serde_json::json!({"type": "get_leaderboard", "data": {"type": "weekly"}}),
    )
    .await;
    match next_message(&mut client).await {
        Some(ServerMessage::Leaderboard(payload)) => {
            assert_eq!(payload.kind.as_str(), "weekly");
            assert!(payload.rankings.is_empty());
        }
        other => panic!("expected leaderboard, got {other:?}"),
    }

    send(
        &mut client,
        serde_json::json!({"type": "get_leaderboard", "data": {"type": "forever"}}),
    )
    .await;
    match next_message(&mut client).await {
        Some(ServerMessage::Error(payload)) => {
            assert_eq!(payload.message, "Invalid leaderboard type")
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_second_new_game_supersedes_first_across_connections() {
    let server = TestServer::start().await;
    let mut first = server.connect("tok-alice").await;
    send(
        &mut first,
        serde_json::json!({"type": "new_game", "data": {"game_mode": "classic"}}),
    )
    .await;
    state(next_message(&mut first).await);

    let mut second = server.connect("tok-alice").await;
    // The second connection is greeted with the classic game
    let greeted = state(next_message(&mut second).await);
    assert_eq!(greeted.game_mode.as_str(), "classic");

    send(
        &mut second,
        serde_json::json!({"type": "new_game", "data": {"game_mode": "challenge"}}),
    )
    .await;
    let challenge = state(next_message(&mut second).await);
    assert!(challenge.disabled_cell.is_some());

    let mut third = server.connect("tok-alice").await;
    let current = state(next_message(&mut third).await);
    assert_eq!(current.board, challenge.board);
    assert_eq!(current.disabled_cell, challenge.disabled_cell);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_closes_live_connections() {
    let server = TestServer::start().await;
    let mut client = server.connect("tok-bob").await;

    // A reply proves the connection is registered
    send(&mut client, serde_json::json!({"type": "bogus"})).await;
    match next_message(&mut client).await {
        Some(ServerMessage::Error(payload)) => assert_eq!(payload.message, "Unknown message type"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(server.server.connection_count().await, 1);

    server.server.shutdown();
    assert!(next_message(&mut client).await.is_none());

    let result = timeout(Duration::from_secs(5), server.task).await;
    assert!(matches!(result, Ok(Ok(Ok(())))));
}

fn fast_keepalive() -> ServerConfig {
    ServerConfig {
        ping_interval: Duration::from_millis(100),
        pong_wait: Duration::from_millis(400),
        ..ServerConfig::default()
    }
}

/// Waits until the server closes a raw socket that never sent anything.
async fn closed_by_server(raw: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match timeout(Duration::from_secs(3), raw.read(&mut buf)).await {
            Err(_) => return false,
            Ok(Ok(0)) | Ok(Err(_)) => return true,
            Ok(Ok(_)) => continue,
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_silent_socket_is_dropped_after_handshake_deadline() {
    let server = TestServer::start_with(ServerConfig {
        pong_wait: Duration::from_millis(300),
        ..ServerConfig::default()
    })
    .await;

    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    assert!(closed_by_server(&mut raw).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pending_handshakes_count_toward_connection_limit() {
    let server = TestServer::start_with(ServerConfig {
        max_connections: 1,
        pong_wait: Duration::from_millis(500),
        ..ServerConfig::default()
    })
    .await;

    let mut idle = TcpStream::connect(server.addr).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    // The idle socket holds the only slot
    let refused = connect_async(format!("ws://{}/ws?token=tok-bob", server.addr)).await;
    assert!(refused.is_err());

    assert!(closed_by_server(&mut idle).await);

    let mut admitted = None;
    for _ in 0..20 {
        if let Ok((client, _)) =
            connect_async(format!("ws://{}/ws?token=tok-bob", server.addr)).await
        {
            admitted = Some(client);
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    let mut client = admitted.expect("slot was never released");

    send(&mut client, serde_json::json!({"type": "bogus"})).await;
    assert!(matches!(
        next_message(&mut client).await,
        Some(ServerMessage::Error(_))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unresponsive_client_is_unregistered() {
    let server = TestServer::start_with(fast_keepalive()).await;
    let mut client = server.connect("tok-bob").await;

    send(&mut client, serde_json::json!({"type": "bogus"})).await;
    assert!(matches!(
        next_message(&mut client).await,
        Some(ServerMessage::Error(_))
    ));
    assert_eq!(server.server.connection_count().await, 1);

    // Stop reading, so pings go unanswered
    sleep(Duration::from_millis(1200)).await;
    assert_eq!(server.server.connection_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pings_keep_an_attentive_client_alive() {
    let server = TestServer::start_with(fast_keepalive()).await;
    let mut client = server.connect("tok-alice").await;

    let deadline = Instant::now() + Duration::from_millis(1200);
    let mut pings = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, client.next()).await {
            Err(_) => break,
            Ok(Some(Ok(Message::Ping(_)))) => pings += 1,
            Ok(Some(Ok(_))) => {}
            Ok(other) => panic!("connection ended early: {other:?}"),
        }
    }

    assert!(pings >= 3, "only {pings} pings seen");
    assert_eq!(server.server.connection_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handshake_finishing_after_shutdown_is_refused() {
    let server = TestServer::start().await;

    let raw = TcpStream::connect(server.addr).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    server.server.shutdown();
    let stopped = timeout(Duration::from_secs(5), server.task).await;
    assert!(matches!(stopped, Ok(Ok(Ok(())))));

    let url = format!("ws://{}/ws?token=tok-alice", server.addr);
    if let Ok((mut late, _)) = client_async(url, raw).await {
        let _ = late
            .send(Message::text(
                serde_json::json!({"type": "new_game", "data": {}}).to_string(),
            ))
            .await;
        assert!(next_message(&mut late).await.is_none());
    }
    assert_eq!(server.server.connection_count().await, 0);
}
