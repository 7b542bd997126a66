//! Room-based WebSocket Chat Server Library
//!
//! A multi-room chat server built with tokio-tungstenite using the Actor
//! pattern for state management.
//!
//! # Features
//! - WebSocket connection handling
//! - Named room joining with per-room unique usernames
//! - Real-time chat messaging with profanity filtering
//! - Map location sharing
//! - Live roster (room member list) updates
//! - Per-event acknowledgements
//! - Disconnection handling
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the user registry and the
//!   room subscription map
//! - Each connection has a `handler` task pair communicating with the server
//! - Every client event carries a `oneshot` acknowledgement channel
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use room_chat_server::{ChatServer, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod client;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod message;
pub mod profanity;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use envelope::{generate_location, generate_message, map_url, LocationMessage, Message};
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{AckError, ClientEvent, ErrorCode, RosterEntry, ServerEvent};
pub use profanity::ProfanityFilter;
pub use registry::{User, UserRegistry};
pub use server::{ChatServer, ServerCommand};
pub use types::ConnectionId;
