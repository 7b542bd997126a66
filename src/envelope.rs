//! Message envelope factory
//!
//! Builds the timestamped envelopes broadcast to a room: chat messages and
//! shared-location links. Timestamps travel as epoch milliseconds, which is
//! what the browser client feeds to its time formatter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender name used for server-generated notices (welcome, joined, left)
pub const SYSTEM_SENDER: &str = "Chat App";

/// A chat message broadcast to a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub username: String,
    pub text: String,
    #[serde(rename = "createdAt", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// A shared map location broadcast to a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationMessage {
    pub username: String,
    pub url: String,
    #[serde(rename = "createdAt", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Build a chat message stamped with the current wall-clock time
pub fn generate_message(username: impl Into<String>, text: impl Into<String>) -> Message {
    generate_message_at(username, text, Utc::now())
}

/// Build a chat message with an explicit timestamp
pub fn generate_message_at(
    username: impl Into<String>,
    text: impl Into<String>,
    created_at: DateTime<Utc>,
) -> Message {
    Message {
        username: username.into(),
        text: text.into(),
        created_at,
    }
}

/// Build a location message stamped with the current wall-clock time
pub fn generate_location(username: impl Into<String>, url: impl Into<String>) -> LocationMessage {
    generate_location_at(username, url, Utc::now())
}

/// Build a location message with an explicit timestamp
pub fn generate_location_at(
    username: impl Into<String>,
    url: impl Into<String>,
    created_at: DateTime<Utc>,
) -> LocationMessage {
    LocationMessage {
        username: username.into(),
        url: url.into(),
        created_at,
    }
}

/// Build a map link from raw coordinates
///
/// No numeric validation: out-of-range input produces a malformed but
/// harmless link.
pub fn map_url(latitude: f64, longitude: f64) -> String {
    format!("https://google.com/maps?q={},{}", latitude, longitude)
}
