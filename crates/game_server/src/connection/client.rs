//! Client connection representation.
//!
//! This module defines the registry's record of one live connection: who
//! it belongs to, where it came from and how to queue frames for it.

use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::sync::mpsc;

/// Represents an individual client connection to the server.
///
/// The registry owns the only sender of the connection's outbound queue, so
/// dropping this record closes the queue and ends the writer task.
///
/// # Fields
///
/// * `user_id` - The verified user behind this connection
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Timestamp when the connection was registered
#[derive(Debug)]
pub struct ClientConnection {
    /// The user this connection was authenticated as
    pub user_id: String,

    /// The remote network address of the client
    pub remote_addr: SocketAddr,

    /// When this connection was registered
    pub connected_at: SystemTime,

    /// Outbound queue of serialized text frames
    pub(crate) sender: mpsc::Sender<String>,
}

impl ClientConnection {
    /// Creates a new client connection record.
    ///
    /// # Arguments
    ///
    /// * `user_id` - The authenticated user
    /// * `remote_addr` - The network address of the connecting client
    /// * `sender` - Producer half of the connection's outbound queue
    pub fn new(user_id: String, remote_addr: SocketAddr, sender: mpsc::Sender<String>) -> Self {
        Self {
            user_id,
            remote_addr,
            connected_at: SystemTime::now(),
            sender,
        }
    }
}
