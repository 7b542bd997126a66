//! Error types for the chat server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// request-level errors (answered through the event acknowledgement).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Username or room missing on join
    #[error("Username and room are required!")]
    Validation,

    /// Username already taken within the room (case-insensitive)
    #[error("Username is in use!")]
    DuplicateUser,

    /// Join attempted by a connection that already has a user
    #[error("You are already in a room")]
    AlreadyJoined,

    /// Message text blocked by the profanity filter
    #[error("Profanity is not allowed")]
    Profanity,

    /// No registered user for a connection expected to be joined
    #[error("User not found")]
    UserNotFound,

    /// Event frame could not be decoded
    #[error("Invalid event")]
    InvalidEvent,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed or full channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The channel buffer is full (slow consumer)
    #[error("Channel full")]
    ChannelFull,
}
