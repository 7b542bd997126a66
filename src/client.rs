//! Connection handle
//!
//! The actor-side handle for one WebSocket connection: its ID and the
//! channel into that connection's write task.

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::ServerEvent;
use crate::types::ConnectionId;

/// Connected client handle
///
/// User identity (username, room) lives in the registry; this struct only
/// carries what the dispatcher needs to deliver events.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Server → Client event channel
    pub sender: mpsc::Sender<ServerEvent>,
}

impl Client {
    /// Create a new client handle with the given ID and sender channel
    pub fn new(id: ConnectionId, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, sender }
    }

    /// Queue an event for this client without blocking
    ///
    /// Fan-out must never stall on one connection, so a full buffer is an
    /// error rather than a wait. Returns an error if the channel is closed
    /// (client disconnected) or full (slow consumer).
    pub fn send(&self, event: ServerEvent) -> Result<(), SendError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
            mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
        })
    }
}
