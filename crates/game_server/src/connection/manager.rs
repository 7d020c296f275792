//! The connection registry ("hub").
//!
//! Owns every live connection's outbound queue. The map lock is held only
//! while the map is read or mutated; sends are non-blocking `try_send`s, so
//! no I/O ever happens under the lock.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::{ClientConnection, ConnectionId};
use crate::messaging::ServerMessage;

/// Registry of live connections.
#[derive(Debug)]
pub struct ConnectionManager {
    connections: Mutex<HashMap<ConnectionId, ClientConnection>>,
    next_id: AtomicUsize,
    queue_capacity: usize,
    /// Set by `close_all`; later registrations are refused.
    closed: AtomicBool,
}

impl ConnectionManager {
    /// Creates an empty registry whose connections get outbound queues of
    /// `queue_capacity` frames.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            queue_capacity: queue_capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Adds a connection for `user_id` and returns its id together with the
    /// consumer half of its outbound queue.
    ///
    /// Returns `None` once [`close_all`](Self::close_all) has run.
    pub async fn register(
        &self,
        user_id: String,
        remote_addr: SocketAddr,
    ) -> Option<(ConnectionId, mpsc::Receiver<String>)> {
        let mut connections = self.connections.lock().await;
        if self.closed.load(Ordering::Acquire) {
            debug!("Registry closed, refusing connection for user {}", user_id);
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        connections.insert(id, ClientConnection::new(user_id, remote_addr, sender));
        debug!("Registered connection {} ({} live)", id, connections.len());

        Some((id, receiver))
    }

    /// Removes a connection, closing its outbound queue.
    pub async fn unregister(&self, id: ConnectionId) -> Option<ClientConnection> {
        let removed = self.connections.lock().await.remove(&id);
        if let Some(conn) = &removed {
            info!("Connection {} for user {} unregistered", id, conn.user_id);
        }
        removed
    }

    /// Queues `message` for one connection.
    ///
    /// Returns `false` when the connection is gone. A connection whose queue
    /// is full is treated as dead and removed.
    pub async fn send_to(&self, id: ConnectionId, message: &ServerMessage) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize message for connection {}: {}", id, e);
                return false;
            }
        };

        let mut connections = self.connections.lock().await;
        let Some(conn) = connections.get(&id) else {
            return false;
        };

        match conn.sender.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for connection {}, dropping it", id);
                connections.remove(&id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                connections.remove(&id);
                false
            }
        }
    }

    /// Best-effort delivery of `message` to every connection.
    ///
    /// Connections that cannot take the frame are removed. Returns how many
    /// connections received it.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize broadcast: {}", e);
                return 0;
            }
        };

        let mut connections = self.connections.lock().await;
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (id, conn) in connections.iter() {
            match conn.sender.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(*id),
            }
        }

        for id in dead {
            warn!("Dropping connection {} during broadcast", id);
            connections.remove(&id);
        }

        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Drops every connection and refuses new registrations. Each writer
    /// sends a Close frame and exits.
    pub async fn close_all(&self) -> usize {
        let mut connections = self.connections.lock().await;
        self.closed.store(true, Ordering::Release);
        let count = connections.len();
        connections.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    #[tokio::test]
    async fn test_register_send_unregister() {
        let manager = ConnectionManager::new(8);
        let (id, mut rx) = manager.register("alice".into(), addr()).await.unwrap();

        assert_eq!(manager.connection_count().await, 1);
        assert!(manager.send_to(id, &ServerMessage::error("hi")).await);
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("\"hi\""));

        assert!(manager.unregister(id).await.is_some());
        assert_eq!(manager.connection_count().await, 0);
        // Queue closes once the registry drops the sender
        assert!(rx.recv().await.is_none());
        assert!(!manager.send_to(id, &ServerMessage::error("late")).await);
    }

    #[tokio::test]
    async fn test_full_queue_drops_connection() {
        let manager = ConnectionManager::new(1);
        let (id, _rx) = manager.register("slow".into(), addr()).await.unwrap();

        assert!(manager.send_to(id, &ServerMessage::error("one")).await);
        assert!(!manager.send_to(id, &ServerMessage::error("two")).await);
        assert_eq!(manager.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_is_best_effort() {
        let manager = ConnectionManager::new(1);
        let (_a, mut rx_a) = manager.register("a".into(), addr()).await.unwrap();
        let (b, _rx_b) = manager.register("b".into(), addr()).await.unwrap();

        // Fill b's queue so the broadcast cannot reach it
        assert!(manager.send_to(b, &ServerMessage::error("busy")).await);

        let delivered = manager.broadcast(&ServerMessage::error("all")).await;
        assert_eq!(delivered, 1);
        assert_eq!(manager.connection_count().await, 1);
        assert!(rx_a.recv().await.unwrap().contains("all"));
    }

    #[tokio::test]
    async fn test_close_all() {
        let manager = ConnectionManager::new(4);
        let (_, mut rx) = manager.register("a".into(), addr()).await.unwrap();
        manager.register("b".into(), addr()).await.unwrap();

        assert_eq!(manager.close_all().await, 2);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_registration_refused_after_close_all() {
        let manager = ConnectionManager::new(4);
        assert_eq!(manager.close_all().await, 0);

        assert!(manager.register("late".into(), addr()).await.is_none());
        assert_eq!(manager.connection_count().await, 0);
    }
}
