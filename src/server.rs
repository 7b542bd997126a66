//! ChatServer Actor implementation
//!
//! The central actor that owns all mutable state: connection handles, the
//! user registry, and the room subscription map. Uses the Actor pattern with
//! mpsc channels for message passing; every client event carries a oneshot
//! acknowledgement channel, so registry mutations are serialized by
//! single-task ownership rather than locks.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::envelope::{generate_location, generate_message, map_url, SYSTEM_SENDER};
use crate::error::AppError;
use crate::message::{RosterEntry, ServerEvent};
use crate::profanity::ProfanityFilter;
use crate::registry::UserRegistry;
use crate::types::ConnectionId;

/// Acknowledgement channel for one client event
pub type AckSender = oneshot::Sender<Result<(), AppError>>;

/// Commands sent from connection handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection established (unjoined)
    Connect {
        id: ConnectionId,
        sender: mpsc::Sender<ServerEvent>,
    },
    /// Join a named room
    Join {
        id: ConnectionId,
        username: String,
        room: String,
        respond_to: AckSender,
    },
    /// Send a chat message to the connection's room
    SendMessage {
        id: ConnectionId,
        text: String,
        respond_to: AckSender,
    },
    /// Share a map location with the connection's room
    SendLocation {
        id: ConnectionId,
        latitude: f64,
        longitude: f64,
        respond_to: AckSender,
    },
    /// Connection closed (terminal)
    Disconnect { id: ConnectionId },
}

/// The main ChatServer actor
///
/// Tracks each connection through Unjoined → Joined → Disconnected: a
/// connection is Joined exactly while the registry holds a user for it.
/// Rooms live in the subscription map only as long as they have members.
pub struct ChatServer {
    /// All connected clients: ConnectionId -> Client
    clients: HashMap<ConnectionId, Client>,
    /// Connection → user store with room membership queries
    registry: UserRegistry,
    /// Broadcast groups: lowercased room name -> member connections in join order
    subscriptions: HashMap<String, Vec<ConnectionId>>,
    /// Message text filter applied before any chat broadcast
    filter: ProfanityFilter,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self::with_filter(receiver, ProfanityFilter::default())
    }

    /// Create a ChatServer with an externally supplied profanity lexicon
    pub fn with_filter(receiver: mpsc::Receiver<ServerCommand>, filter: ProfanityFilter) -> Self {
        Self {
            clients: HashMap::new(),
            registry: UserRegistry::new(),
            subscriptions: HashMap::new(),
            filter,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { id, sender } => {
                self.handle_connect(id, sender);
            }
            ServerCommand::Join {
                id,
                username,
                room,
                respond_to,
            } => {
                let result = self.handle_join(id, &username, &room);
                let _ = respond_to.send(result);
            }
            ServerCommand::SendMessage {
                id,
                text,
                respond_to,
            } => {
                let result = self.handle_send_message(id, text);
                let _ = respond_to.send(result);
            }
            ServerCommand::SendLocation {
                id,
                latitude,
                longitude,
                respond_to,
            } => {
                let result = self.handle_send_location(id, latitude, longitude);
                let _ = respond_to.send(result);
            }
            ServerCommand::Disconnect { id } => {
                self.handle_disconnect(id);
            }
        }
    }

    /// Handle new connection
    fn handle_connect(&mut self, id: ConnectionId, sender: mpsc::Sender<ServerEvent>) {
        info!("Connection {} established", id);
        self.clients.insert(id, Client::new(id, sender));
        debug!(
            "Total connections: {}, joined users: {}",
            self.clients.len(),
            self.registry.len()
        );
    }

    /// Handle a join request
    ///
    /// On success the joiner gets a private welcome, the rest of the room a
    /// joined notice, and everyone (joiner included) the updated roster.
    /// On failure nothing changes and the connection stays unjoined.
    fn handle_join(&mut self, id: ConnectionId, username: &str, room: &str) -> Result<(), AppError> {
        // Join is only valid from the unjoined state; a connection holds at
        // most one user at a time
        if self.registry.get_user(id).is_some() {
            warn!("Connection {} attempted a second join", id);
            return Err(AppError::AlreadyJoined);
        }

        let user = match self.registry.add_user(id, username, room) {
            Ok(user) => user.clone(),
            Err(e) => {
                warn!("Connection {} failed to join '{}': {}", id, room, e);
                return Err(e);
            }
        };

        info!(
            "Connection {} joined room '{}' as '{}'",
            id, user.room, user.username
        );

        self.subscribe(id, &user.room);

        if let Some(client) = self.clients.get(&id) {
            let welcome = ServerEvent::Message(generate_message(SYSTEM_SENDER, "Welcome!"));
            if let Err(e) = client.send(welcome) {
                warn!("Failed to deliver welcome to {}: {}", id, e);
            }
        }

        let notice = ServerEvent::Message(generate_message(
            SYSTEM_SENDER,
            format!("{} has joined!", user.username),
        ));
        self.broadcast_except(&user.room, id, notice);

        self.broadcast_roster(&user.room);

        Ok(())
    }

    /// Handle a chat message
    ///
    /// Profanity is rejected before any registry access; an unjoined
    /// connection (including one racing a disconnect) gets `UserNotFound`.
    fn handle_send_message(&mut self, id: ConnectionId, text: String) -> Result<(), AppError> {
        if self.filter.is_profane(&text) {
            debug!("Connection {} message blocked by profanity filter", id);
            return Err(AppError::Profanity);
        }

        let Some(user) = self.registry.get_user(id) else {
            warn!("Connection {} sent a message without joining", id);
            return Err(AppError::UserNotFound);
        };
        let (username, room) = (user.username.clone(), user.room.clone());

        // Sender included, so every client sees identical ordering
        self.broadcast(
            &room,
            ServerEvent::Message(generate_message(username, text)),
        );

        Ok(())
    }

    /// Handle a location share
    fn handle_send_location(
        &mut self,
        id: ConnectionId,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), AppError> {
        let Some(user) = self.registry.get_user(id) else {
            warn!("Connection {} sent a location without joining", id);
            return Err(AppError::UserNotFound);
        };
        let (username, room) = (user.username.clone(), user.room.clone());

        let event = ServerEvent::LocationMsg(generate_location(
            username,
            map_url(latitude, longitude),
        ));
        self.broadcast(&room, event);

        Ok(())
    }

    /// Handle connection teardown
    ///
    /// Silent no-op for connections that never joined; otherwise the
    /// remaining members get a left notice and the shrunken roster.
    fn handle_disconnect(&mut self, id: ConnectionId) {
        info!("Connection {} closed", id);
        self.clients.remove(&id);

        let Some(user) = self.registry.remove_user(id) else {
            debug!("Connection {} closed before joining", id);
            return;
        };

        self.unsubscribe(id, &user.room);

        let notice = ServerEvent::Message(generate_message(
            SYSTEM_SENDER,
            format!("{} has left", user.username),
        ));
        self.broadcast(&user.room, notice);
        self.broadcast_roster(&user.room);

        debug!(
            "Total connections: {}, joined users: {}",
            self.clients.len(),
            self.registry.len()
        );
    }

    /// Add a connection to a room's broadcast group
    fn subscribe(&mut self, id: ConnectionId, room: &str) {
        self.subscriptions
            .entry(room_key(room))
            .or_default()
            .push(id);
    }

    /// Remove a connection from a room's broadcast group
    ///
    /// The group itself vanishes with its last member.
    fn unsubscribe(&mut self, id: ConnectionId, room: &str) {
        let key = room_key(room);
        if let Some(members) = self.subscriptions.get_mut(&key) {
            members.retain(|member| *member != id);
            if members.is_empty() {
                self.subscriptions.remove(&key);
                debug!("Room '{}' is now empty", room);
            }
        }
    }

    /// Fan an event out to every member of a room
    ///
    /// Best-effort: a full or closed channel is logged and skipped, so one
    /// slow connection never stalls the rest.
    fn broadcast(&self, room: &str, event: ServerEvent) {
        let Some(members) = self.subscriptions.get(&room_key(room)) else {
            return;
        };
        for id in members {
            if let Some(client) = self.clients.get(id) {
                if let Err(e) = client.send(event.clone()) {
                    warn!("Dropping event for {}: {}", id, e);
                }
            }
        }
    }

    /// Fan an event out to every member of a room except one connection
    fn broadcast_except(&self, room: &str, skip: ConnectionId, event: ServerEvent) {
        let Some(members) = self.subscriptions.get(&room_key(room)) else {
            return;
        };
        for id in members.iter().filter(|id| **id != skip) {
            if let Some(client) = self.clients.get(id) {
                if let Err(e) = client.send(event.clone()) {
                    warn!("Dropping event for {}: {}", id, e);
                }
            }
        }
    }

    /// Send the current roster to the whole room
    fn broadcast_roster(&self, room: &str) {
        let users = self
            .registry
            .users_in_room(room)
            .into_iter()
            .map(|user| RosterEntry {
                username: user.username.clone(),
            })
            .collect();
        self.broadcast(
            room,
            ServerEvent::RoomData {
                room: room.to_string(),
                users,
            },
        );
    }
}

/// Case-insensitive subscription key for a room name
fn room_key(room: &str) -> String {
    room.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Message;

    /// Spawn an actor and return its command channel
    fn start_server() -> mpsc::Sender<ServerCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(ChatServer::new(cmd_rx).run());
        cmd_tx
    }

    /// Register a fresh connection, returning its id and event receiver
    async fn connect(
        cmd_tx: &mpsc::Sender<ServerCommand>,
    ) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(64);
        cmd_tx
            .send(ServerCommand::Connect { id, sender: tx })
            .await
            .unwrap();
        (id, rx)
    }

    async fn join(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        id: ConnectionId,
        username: &str,
        room: &str,
    ) -> Result<(), AppError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        cmd_tx
            .send(ServerCommand::Join {
                id,
                username: username.to_string(),
                room: room.to_string(),
                respond_to: ack_tx,
            })
            .await
            .unwrap();
        ack_rx.await.unwrap()
    }

    async fn send_message(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        id: ConnectionId,
        text: &str,
    ) -> Result<(), AppError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        cmd_tx
            .send(ServerCommand::SendMessage {
                id,
                text: text.to_string(),
                respond_to: ack_tx,
            })
            .await
            .unwrap();
        ack_rx.await.unwrap()
    }

    async fn send_location(
        cmd_tx: &mpsc::Sender<ServerCommand>,
        id: ConnectionId,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), AppError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        cmd_tx
            .send(ServerCommand::SendLocation {
                id,
                latitude,
                longitude,
                respond_to: ack_tx,
            })
            .await
            .unwrap();
        ack_rx.await.unwrap()
    }

    async fn disconnect(cmd_tx: &mpsc::Sender<ServerCommand>, id: ConnectionId) {
        cmd_tx
            .send(ServerCommand::Disconnect { id })
            .await
            .unwrap();
    }

    /// Pull the next event, panicking if it is not a chat message
    fn expect_message(rx: &mut mpsc::Receiver<ServerEvent>) -> Message {
        match rx.try_recv().expect("expected a queued event") {
            ServerEvent::Message(msg) => msg,
            other => panic!("expected message, got {:?}", other),
        }
    }

    fn expect_roster(rx: &mut mpsc::Receiver<ServerEvent>) -> (String, Vec<String>) {
        match rx.try_recv().expect("expected a queued event") {
            ServerEvent::RoomData { room, users } => {
                (room, users.into_iter().map(|u| u.username).collect())
            }
            other => panic!("expected roomData, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_solo_join_gets_welcome_and_roster() {
        let cmd_tx = start_server();
        let (bob, mut bob_rx) = connect(&cmd_tx).await;

        join(&cmd_tx, bob, "Bob", "lobby").await.unwrap();

        let welcome = expect_message(&mut bob_rx);
        assert_eq!(welcome.username, SYSTEM_SENDER);
        assert_eq!(welcome.text, "Welcome!");

        let (room, users) = expect_roster(&mut bob_rx);
        assert_eq!(room, "lobby");
        assert_eq!(users, vec!["Bob"]);

        // Nothing else queued; the joined notice goes to others only
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        let (bob, mut bob_rx) = connect(&cmd_tx).await;

        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();
        alice_rx.try_recv().unwrap(); // welcome
        alice_rx.try_recv().unwrap(); // roster

        join(&cmd_tx, bob, "Bob", "lobby").await.unwrap();

        let notice = expect_message(&mut alice_rx);
        assert_eq!(notice.username, SYSTEM_SENDER);
        assert_eq!(notice.text, "Bob has joined!");

        let (_, users) = expect_roster(&mut alice_rx);
        assert_eq!(users, vec!["Alice", "Bob"]);

        // Bob sees his welcome and the same roster, not his own notice
        let welcome = expect_message(&mut bob_rx);
        assert_eq!(welcome.text, "Welcome!");
        let (_, users) = expect_roster(&mut bob_rx);
        assert_eq!(users, vec!["Alice", "Bob"]);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_join_leaves_connection_unjoined() {
        let cmd_tx = start_server();
        let (alice, _alice_rx) = connect(&cmd_tx).await;
        let (imposter, mut imposter_rx) = connect(&cmd_tx).await;

        join(&cmd_tx, alice, "Alice", "room1").await.unwrap();

        let err = join(&cmd_tx, imposter, "alice", "room1").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUser));
        assert!(imposter_rx.try_recv().is_err());

        // Still unjoined: messages are rejected
        let err = send_message(&cmd_tx, imposter, "hello").await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn test_second_join_is_rejected() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();
        while alice_rx.try_recv().is_ok() {}

        let err = join(&cmd_tx, alice, "Alice2", "other").await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyJoined));
        assert!(alice_rx.try_recv().is_err());

        // Still joined to the original room
        send_message(&cmd_tx, alice, "still in lobby").await.unwrap();
        let msg = expect_message(&mut alice_rx);
        assert_eq!(msg.text, "still in lobby");
    }

    #[tokio::test]
    async fn test_join_rejects_blank_fields() {
        let cmd_tx = start_server();
        let (id, mut rx) = connect(&cmd_tx).await;

        let err = join(&cmd_tx, id, "   ", "lobby").await.unwrap_err();
        assert!(matches!(err, AppError::Validation));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_message_broadcast_includes_sender() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        let (bob, mut bob_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();
        join(&cmd_tx, bob, "Bob", "lobby").await.unwrap();
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        send_message(&cmd_tx, alice, "hello there").await.unwrap();

        for rx in [&mut alice_rx, &mut bob_rx] {
            let msg = expect_message(rx);
            assert_eq!(msg.username, "Alice");
            assert_eq!(msg.text, "hello there");
        }
    }

    #[tokio::test]
    async fn test_profane_message_is_not_broadcast() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        let (bob, mut bob_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();
        join(&cmd_tx, bob, "Bob", "lobby").await.unwrap();
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        let err = send_message(&cmd_tx, alice, "you are a jerk")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Profanity));
        assert_eq!(err.to_string(), "Profanity is not allowed");

        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_location_broadcast_embeds_coordinates() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();
        while alice_rx.try_recv().is_ok() {}

        send_location(&cmd_tx, alice, 40.0, -75.0).await.unwrap();

        match alice_rx.try_recv().unwrap() {
            ServerEvent::LocationMsg(loc) => {
                assert_eq!(loc.username, "Alice");
                assert_eq!(loc.url, "https://google.com/maps?q=40,-75");
            }
            other => panic!("expected locationMsg, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_location_requires_join() {
        let cmd_tx = start_server();
        let (id, _rx) = connect(&cmd_tx).await;

        let err = send_location(&cmd_tx, id, 1.0, 2.0).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_remaining_members() {
        let cmd_tx = start_server();
        let (carol, _carol_rx) = connect(&cmd_tx).await;
        let (dave, mut dave_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, carol, "Carol", "r1").await.unwrap();
        join(&cmd_tx, dave, "Dave", "r1").await.unwrap();
        while dave_rx.try_recv().is_ok() {}

        disconnect(&cmd_tx, carol).await;
        // Follow with an acked command so the disconnect is fully processed
        send_message(&cmd_tx, dave, "still here").await.unwrap();

        let notice = expect_message(&mut dave_rx);
        assert_eq!(notice.username, SYSTEM_SENDER);
        assert_eq!(notice.text, "Carol has left");

        let (room, users) = expect_roster(&mut dave_rx);
        assert_eq!(room, "r1");
        assert_eq!(users, vec!["Dave"]);
    }

    #[tokio::test]
    async fn test_disconnect_before_join_is_silent() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        let (ghost, _ghost_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();
        while alice_rx.try_recv().is_ok() {}

        disconnect(&cmd_tx, ghost).await;
        send_message(&cmd_tx, alice, "anyone?").await.unwrap();

        // Only Alice's own message, no left notice or roster churn
        let msg = expect_message(&mut alice_rx);
        assert_eq!(msg.text, "anyone?");
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_message_after_disconnect_is_rejected() {
        let cmd_tx = start_server();
        let (alice, _alice_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();

        disconnect(&cmd_tx, alice).await;

        let err = send_message(&cmd_tx, alice, "too late").await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound));
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        let (bob, mut bob_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "red").await.unwrap();
        join(&cmd_tx, bob, "Bob", "blue").await.unwrap();
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        send_message(&cmd_tx, alice, "red only").await.unwrap();

        let msg = expect_message(&mut alice_rx);
        assert_eq!(msg.text, "red only");
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_room_names_match_case_insensitively() {
        let cmd_tx = start_server();
        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        let (bob, mut bob_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "Lobby").await.unwrap();
        join(&cmd_tx, bob, "Bob", "lobby").await.unwrap();
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        send_message(&cmd_tx, bob, "same room").await.unwrap();

        let msg = expect_message(&mut alice_rx);
        assert_eq!(msg.text, "same room");
    }

    #[tokio::test]
    async fn test_custom_lexicon() {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let filter = ProfanityFilter::with_words(["banana"]);
        tokio::spawn(ChatServer::with_filter(cmd_rx, filter).run());

        let (alice, mut alice_rx) = connect(&cmd_tx).await;
        join(&cmd_tx, alice, "Alice", "lobby").await.unwrap();
        while alice_rx.try_recv().is_ok() {}

        let err = send_message(&cmd_tx, alice, "banana bread").await.unwrap_err();
        assert!(matches!(err, AppError::Profanity));
        assert!(alice_rx.try_recv().is_err());
    }
}
