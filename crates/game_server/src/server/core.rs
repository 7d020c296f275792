//! Core game server implementation.
//!
//! This module contains the main `GameServer` struct: listener setup, the
//! accept loop, connection limits and shutdown.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use super::handlers::handle_connection;
use super::{Collaborators, ServerContext};
use crate::config::ServerConfig;
use crate::error::ServerError;

/// Listen backlog passed to `listen(2)`.
const LISTEN_BACKLOG: i32 = 1024;

/// The core game server structure.
///
/// `GameServer` owns the shared [`ServerContext`] and runs the accept loop.
/// Each accepted socket gets its own task running
/// [`handle_connection`](super::handle_connection).
///
/// # Lifecycle
///
/// 1. [`GameServer::new`] wires the collaborators into a context
/// 2. [`GameServer::start`] binds the configured address, or
///    [`GameServer::serve`] runs on an existing listener
/// 3. [`GameServer::shutdown`] stops accepting and closes every connection
pub struct GameServer {
    /// Shared state handed to every connection task
    ctx: Arc<ServerContext>,

    /// Channel for coordinating server shutdown
    shutdown_sender: watch::Sender<bool>,
}

impl GameServer {
    /// Creates a new game server with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    /// * `collaborators` - Storage, cache, identity and engine implementations
    ///
    /// # Returns
    ///
    /// A new `GameServer` instance ready to be started.
    pub fn new(config: ServerConfig, collaborators: Collaborators) -> Self {
        let (shutdown_sender, _) = watch::channel(false);
        Self {
            ctx: Arc::new(ServerContext::new(config, collaborators)),
            shutdown_sender,
        }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server started and stopped cleanly, or a `ServerError`
    /// if the listener could not be created.
    pub async fn start(&self) -> Result<(), ServerError> {
        let listener = bind_listener(self.ctx.config.bind_address)?;
        self.serve(listener).await
    }

    /// Runs the accept loop on `listener` until [`shutdown`](Self::shutdown)
    /// is called or accepting fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(format!("Listener address unavailable: {e}")))?;
        info!("🚀 Game server listening on {}", local_addr);

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        let max_connections = self.ctx.config.max_connections;
        // One slot per socket from accept until its task ends, handshake included
        let slot_count = max_connections.min(Semaphore::MAX_PERMITS);
        let connection_slots = Arc::new(Semaphore::new(slot_count));

        let result = loop {
            if *shutdown_receiver.borrow_and_update() {
                break Ok(());
            }

            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            break Err(ServerError::Network(format!("Accept failed: {e}")));
                        }
                    };

                    let Ok(slot) = connection_slots.clone().try_acquire_owned() else {
                        warn!(
                            "Connection limit {} reached, dropping connection from {}",
                            max_connections, addr
                        );
                        continue;
                    };

                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        let _slot = slot;
                        if let Err(e) = handle_connection(stream, addr, ctx).await {
                            debug!("Connection from {} ended with error: {}", addr, e);
                        }
                    });
                }
                _ = shutdown_receiver.changed() => {
                    info!("Shutdown signal received");
                }
            }
        };

        let closed = self.ctx.connections.close_all().await;
        info!("🧹 Closed {} live connection(s), server stopped", closed);
        result
    }

    /// Signals the accept loop to stop and closes every connection.
    pub fn shutdown(&self) {
        self.shutdown_sender.send_replace(true);
    }

    /// Number of registered (authenticated) connections.
    pub async fn connection_count(&self) -> usize {
        self.ctx.connections.connection_count().await
    }
}

/// Creates a non-blocking tokio listener via socket2 with `SO_REUSEADDR`.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
    if let Err(e) = socket.set_reuse_address(true) {
        warn!("Failed to set SO_REUSEADDR: {}", e);
    }

    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::Network(format!("Bind failed: {e}")))?;
    socket
        .listen(LISTEN_BACKLOG)
        .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::Network(format!("Set non-blocking failed: {e}")))?;

    let std_listener: StdTcpListener = socket.into();
    TcpListener::from_std(std_listener)
        .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))
}
