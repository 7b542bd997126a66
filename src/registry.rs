//! User registry
//!
//! In-memory store mapping each live connection to its user state, plus
//! room membership queries. Owned exclusively by the `ChatServer` actor,
//! so no internal locking is needed.
//!
//! Rooms are not stored: a room exists exactly while at least one user
//! references its name.

use std::collections::HashMap;

use crate::error::AppError;
use crate::types::ConnectionId;

/// A joined user
///
/// One per live connection at most. Username and room keep the casing the
/// user typed; comparisons are ASCII case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Owning connection
    pub id: ConnectionId,
    /// Display name, trimmed
    pub username: String,
    /// Room name, trimmed
    pub room: String,
}

/// Connection → user store with join-order room rosters
///
/// HashMap for O(1) lookups by connection, with a separate join-order list
/// so rosters come out in the order users arrived.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: HashMap<ConnectionId, User>,
    join_order: Vec<ConnectionId>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user for a connection
    ///
    /// Trims username and room, rejects empty fields with
    /// `AppError::Validation`, and rejects a case-insensitive
    /// `(username, room)` collision with `AppError::DuplicateUser`.
    pub fn add_user(
        &mut self,
        id: ConnectionId,
        username: &str,
        room: &str,
    ) -> Result<&User, AppError> {
        let username = username.trim();
        let room = room.trim();

        if username.is_empty() || room.is_empty() {
            return Err(AppError::Validation);
        }

        let taken = self.users.values().any(|u| {
            u.room.eq_ignore_ascii_case(room) && u.username.eq_ignore_ascii_case(username)
        });
        if taken {
            return Err(AppError::DuplicateUser);
        }

        let user = User {
            id,
            username: username.to_string(),
            room: room.to_string(),
        };
        self.users.insert(id, user);
        self.join_order.push(id);

        Ok(&self.users[&id])
    }

    /// Remove and return the user for a connection
    ///
    /// No-op returning `None` when the connection has no user (safe to call
    /// twice).
    pub fn remove_user(&mut self, id: ConnectionId) -> Option<User> {
        let user = self.users.remove(&id)?;
        self.join_order.retain(|other| *other != id);
        Some(user)
    }

    /// Look up the user for a connection
    pub fn get_user(&self, id: ConnectionId) -> Option<&User> {
        self.users.get(&id)
    }

    /// Current members of a room, in join order
    ///
    /// Room names match ASCII case-insensitively after trimming.
    pub fn users_in_room(&self, room: &str) -> Vec<&User> {
        let room = room.trim();
        self.join_order
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter(|u| u.room.eq_ignore_ascii_case(room))
            .collect()
    }

    /// Total registered users across all rooms
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
