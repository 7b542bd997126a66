//! Event protocol definitions
//!
//! JSON-based bidirectional event protocol using Serde's tagged enum
//! for type-safe serialization/deserialization. Event and field names are
//! camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::envelope::{LocationMessage, Message};
use crate::error::AppError;

/// Client → Server event
///
/// Every client event is answered with exactly one `ServerEvent::Ack`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Join a named room
    Join { username: String, room: String },
    /// Send a chat message to the current room
    SendMessage { text: String },
    /// Share a map location with the current room
    SendLocation { latitude: f64, longitude: f64 },
}

/// Server → Client event
///
/// Acks go only to the originating connection; the rest are room-scoped
/// broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Acknowledgement for a client event; `error` is absent on success
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<AckError>,
    },
    /// Chat message (user-sent or server notice)
    Message(Message),
    /// Shared location link
    LocationMsg(LocationMessage),
    /// Room roster update, users in join order
    RoomData { room: String, users: Vec<RosterEntry> },
}

/// One roster row in a `roomData` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub username: String,
}

/// Error payload carried inside a failed ack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckError {
    pub code: ErrorCode,
    pub message: String,
}

/// Error codes for failed acks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// Missing username or room on join
    Validation,
    /// Username collision within the room
    DuplicateUser,
    /// Join from a connection that already has a user
    AlreadyJoined,
    /// Message blocked by the profanity filter
    Profanity,
    /// Connection has no registered user
    UserNotFound,
    /// Event frame could not be decoded
    InvalidEvent,
}

impl ServerEvent {
    /// Successful acknowledgement
    pub fn ack_ok() -> Self {
        ServerEvent::Ack { error: None }
    }

    /// Failed acknowledgement carrying the error
    pub fn ack_err(err: &AppError) -> Self {
        ServerEvent::Ack {
            error: Some(AckError::from(err)),
        }
    }
}

/// Convert AppError to the wire payload for a failed ack
impl From<&AppError> for AckError {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::Validation => ErrorCode::Validation,
            AppError::DuplicateUser => ErrorCode::DuplicateUser,
            AppError::AlreadyJoined => ErrorCode::AlreadyJoined,
            AppError::Profanity => ErrorCode::Profanity,
            AppError::UserNotFound => ErrorCode::UserNotFound,
            // Fatal errors normally close the connection instead, but any
            // that reach an ack surface as a malformed-event failure.
            _ => ErrorCode::InvalidEvent,
        };
        AckError {
            code,
            message: err.to_string(),
        }
    }
}
